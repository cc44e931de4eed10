//! Terminal configuration management

use anyhow::{Context, Result, anyhow};
use common::lock::{DEFAULT_LOCK_DIR, DEFAULT_LOCK_PREFIX};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::usb::discovery::MAX_SCS_DEVICES;
use crate::usb::sysfs::{DEFAULT_DEVICE_DIR, DEFAULT_SYSFS_ROOT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermConfig {
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default = "TerminalSettings::default_log_level")]
    pub log_level: String,
    /// Baud rate used when a device path is given without a baud rate,
    /// and for discovered devices of an unknown model
    #[serde(default = "TerminalSettings::default_fallback_baud")]
    pub fallback_baud: u32,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            fallback_baud: Self::default_fallback_baud(),
        }
    }
}

impl TerminalSettings {
    fn default_log_level() -> String {
        "warn".to_string()
    }

    fn default_fallback_baud() -> u32 {
        115_200
    }
}

/// UUCP lock file settings
///
/// These must match the other programs that share the serial ports,
/// otherwise the locks do not exclude anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default = "LockSettings::default_directory")]
    pub directory: PathBuf,
    #[serde(default = "LockSettings::default_prefix")]
    pub prefix: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            directory: Self::default_directory(),
            prefix: Self::default_prefix(),
        }
    }
}

impl LockSettings {
    fn default_directory() -> PathBuf {
        PathBuf::from(DEFAULT_LOCK_DIR)
    }

    fn default_prefix() -> String {
        DEFAULT_LOCK_PREFIX.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Directory with one entry per USB device and interface
    #[serde(default = "UsbSettings::default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// Directory holding the tty device nodes
    #[serde(default = "UsbSettings::default_device_dir")]
    pub device_dir: PathBuf,
    /// Maximum number of modems reported by one discovery pass
    #[serde(default = "UsbSettings::default_max_devices")]
    pub max_devices: usize,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            sysfs_root: Self::default_sysfs_root(),
            device_dir: Self::default_device_dir(),
            max_devices: Self::default_max_devices(),
        }
    }
}

impl UsbSettings {
    fn default_sysfs_root() -> PathBuf {
        PathBuf::from(DEFAULT_SYSFS_ROOT)
    }

    fn default_device_dir() -> PathBuf {
        PathBuf::from(DEFAULT_DEVICE_DIR)
    }

    fn default_max_devices() -> usize {
        MAX_SCS_DEVICES
    }
}

impl TermConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/scs-term/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: TermConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.expand_paths();
        config.validate()?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("scs-term").join("config.toml")
        } else {
            PathBuf::from(".config/scs-term/config.toml")
        }
    }

    /// Expand `~` in configured directories
    fn expand_paths(&mut self) {
        for path in [
            &mut self.lock.directory,
            &mut self.usb.sysfs_root,
            &mut self.usb.device_dir,
        ] {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            *path = PathBuf::from(expanded);
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.terminal.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.terminal.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.terminal.fallback_baud == 0 {
            return Err(anyhow!("fallback_baud must be greater than 0"));
        }

        if self.lock.prefix.is_empty() {
            return Err(anyhow!("Lock file prefix must not be empty"));
        }

        if self.lock.prefix.contains('/') {
            return Err(anyhow!(
                "Invalid lock file prefix '{}', must not contain '/'",
                self.lock.prefix
            ));
        }

        if !(1..=MAX_SCS_DEVICES).contains(&self.usb.max_devices) {
            return Err(anyhow!(
                "Invalid max_devices {}, must be between 1 and {}",
                self.usb.max_devices,
                MAX_SCS_DEVICES
            ));
        }

        Ok(())
    }
}
