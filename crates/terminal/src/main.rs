//! scs-term
//!
//! Interactive terminal for SCS USB radio modems (PTC-IIusb, PTC-IIIusb,
//! P4dragon). Finds the modem's tty, locks it UUCP style, configures the line
//! and copies bytes between the terminal and the modem until interrupted.

mod config;
mod session;
mod usb;

use anyhow::{Context, Result};
use clap::Parser;
use common::catalog::SCS_VENDOR_ID;
use common::{LockStore, setup_logging};
use session::{Controller, RawLine, Target};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use tracing::{debug, info};
use usb::{Discovery, RusbEnumerator, TtyResolver};

#[derive(Parser, Debug)]
#[command(name = "scs-term")]
#[command(author, version, about = "Terminal for SCS USB radio modems")]
#[command(long_about = "
A simple terminal for SCS USB radio modems. Without arguments the attached
modems are found over USB and, if there is more than one, you are asked to
pick one. The baud rate follows the modem model.

EXAMPLES:
    # Find the modem automatically
    scs-term

    # Use a given serial device at 115200 baud
    scs-term /dev/ttyUSB0 115200

    # List attached SCS modems and exit
    scs-term --list-devices

    # Run with debug logging
    scs-term --log-level debug

CONFIGURATION:
    The terminal looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/scs-term/config.toml
    3. /etc/scs-term/config.toml
    4. Built-in defaults

Press CTRL-C to end a session.
")]
struct Args {
    /// Serial device to use instead of searching for a modem
    #[arg(value_name = "DEVICE")]
    device: Option<PathBuf>,

    /// Baud rate for DEVICE (default from configuration)
    #[arg(value_name = "BAUD", requires = "device")]
    baud: Option<u32>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached SCS modems and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::TermConfig::default();
        let path = config::TermConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::TermConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::TermConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.terminal.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;
    debug!("Log level: {}", log_level);

    let discovery = Discovery::new(
        RusbEnumerator,
        TtyResolver::new(&config.usb.sysfs_root, &config.usb.device_dir),
    )
    .with_max_devices(config.usb.max_devices);

    if args.list_devices {
        return list_devices_mode(&discovery);
    }

    print_banner();

    let target = match args.device {
        Some(path) => Target::Explicit {
            path,
            baud: args.baud,
        },
        None => Target::Discover,
    };
    let explicit = matches!(target, Target::Explicit { .. });

    let locks = LockStore::new(&config.lock.directory, config.lock.prefix.as_str());
    let mut controller = Controller::new(&locks, RawLine, config.terminal.fallback_baud);

    let stdin = io::stdin();
    let stdout = io::stdout();

    let selection = controller
        .select(target, &discovery, &mut stdin.lock(), &mut stdout.lock())
        .context("Device selection failed")?;

    if explicit {
        println!(
            "Using {} with {} baud",
            selection.tty_path.display(),
            selection.baud
        );
    } else {
        println!("Using {} on {}", selection.label, selection.tty_path.display());
    }

    let running = session::signals::install().context("Failed to install signal handlers")?;

    // The bridge reads the raw descriptor; stdin's buffer is only used for
    // the selection prompt
    let mut input = stdin
        .as_fd()
        .try_clone_to_owned()
        .map(File::from)
        .context("Failed to duplicate stdin")?;

    let outcome = controller.run(&selection, &mut input, &mut stdout.lock(), running);

    println!();
    let exit = outcome
        .with_context(|| format!("Session on {} failed", selection.tty_path.display()))?;
    info!("Session ended: {:?}", exit);

    Ok(())
}

fn print_banner() {
    println!("SCS Term");
    println!("Version {}", env!("CARGO_PKG_VERSION"));
    println!("Copyright (C) 2005 - 2021 SCS GmbH & Co. KG, Hanau, Germany");
    println!("press CTRL-C to end program");
    println!();
}

/// List attached SCS modems and exit
fn list_devices_mode<E: usb::UsbEnumerator>(discovery: &Discovery<E>) -> Result<()> {
    info!("Listing SCS modems...");

    let devices = discovery.discover().context("USB discovery failed")?;

    let mut out = io::stdout().lock();
    if devices.is_empty() {
        writeln!(out, "No SCS devices found!")?;
    } else {
        writeln!(out, "Found {} SCS device(s):\n", devices.len())?;
        for device in &devices {
            writeln!(
                out,
                "  {:<16} {} ({:04x}:{:04x})",
                device.tty_path.display().to_string(),
                session::selection::model_label(device),
                SCS_VENDOR_ID,
                device.product_id
            )?;
        }
    }

    Ok(())
}
