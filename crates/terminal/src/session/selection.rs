//! Choosing one modem out of a discovery snapshot

use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use super::SessionError;
use crate::usb::DiscoveredDevice;

/// Label shown for a device whose model code has no catalog name
pub const UNKNOWN_MODEL: &str = "unknown SCS model";

/// The device a session will use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tty_path: PathBuf,
    pub baud: u32,
    /// Model name, or the device path when given explicitly
    pub label: String,
}

impl Selection {
    /// A device given on the command line
    pub fn explicit(tty_path: PathBuf, baud: u32) -> Self {
        let label = tty_path.display().to_string();
        Self {
            tty_path,
            baud,
            label,
        }
    }

    /// A discovered device at its model's nominal rate
    ///
    /// Models without a catalog entry run at `fallback_baud`.
    pub fn discovered(device: &DiscoveredDevice, fallback_baud: u32) -> Self {
        let profile = device.profile();
        let (label, baud) = if profile.is_known() {
            (profile.display_name.to_string(), profile.nominal_baud)
        } else {
            warn!(
                "{} has unknown model code {}, using {} baud",
                device.tty_path.display(),
                device.model_code,
                fallback_baud
            );
            (UNKNOWN_MODEL.to_string(), fallback_baud)
        };

        Self {
            tty_path: device.tty_path.clone(),
            baud,
            label,
        }
    }
}

/// Display name of a discovered device
pub fn model_label(device: &DiscoveredDevice) -> &'static str {
    let profile = device.profile();
    if profile.is_known() {
        profile.display_name
    } else {
        UNKNOWN_MODEL
    }
}

/// Pick one candidate, asking the operator when there is more than one
///
/// The answer is a 1-based index read as one line from `input`. Anything
/// else ends the selection; there is no second prompt.
pub fn choose<R, W>(
    candidates: &[DiscoveredDevice],
    input: &mut R,
    prompt: &mut W,
) -> Result<usize, SessionError>
where
    R: BufRead,
    W: Write,
{
    match candidates.len() {
        0 => return Err(SessionError::NoCandidates),
        1 => return Ok(0),
        _ => {}
    }

    writeln!(prompt, "More than one SCS modem found! Please choose:")
        .map_err(SessionError::SelectionIo)?;
    for (i, device) in candidates.iter().enumerate() {
        writeln!(
            prompt,
            "{}: {:<16} {}",
            i + 1,
            device.tty_path.display().to_string(),
            model_label(device)
        )
        .map_err(SessionError::SelectionIo)?;
    }
    write!(prompt, "Enter a number: ").map_err(SessionError::SelectionIo)?;
    prompt.flush().map_err(SessionError::SelectionIo)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(SessionError::SelectionIo)?;
    let answer = line.trim();

    match answer.parse::<usize>() {
        Ok(n) if (1..=candidates.len()).contains(&n) => {
            info!("Selected candidate {}", n);
            Ok(n - 1)
        }
        _ => Err(SessionError::AmbiguousSelectionInput {
            input: answer.to_string(),
        }),
    }
}
