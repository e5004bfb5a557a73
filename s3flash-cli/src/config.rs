//! Configuration file support for s3flash.
//!
//! Sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (S3FLASH_*)
//! 3. Local config file (./s3flash.toml)
//! 4. Global config file (e.g. ~/.config/s3flash/config.toml)
//!
//! `--config PATH` replaces 3 and 4 with a single file.

use {
    directories::ProjectDirs,
    log::{debug, info, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Name of the per-project config file.
pub const LOCAL_CONFIG: &str = "s3flash.toml";

/// USB VID/PID of a bridge the user chose before.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// `[connection]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Transfer baud rate.
    pub baud: Option<u32>,
}

/// `[port]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Remembered USB devices, treated like known bridges during selection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// `[flash]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Erase the whole flash before every write.
    #[serde(default)]
    pub erase_before_write: bool,
    /// Ask the engine to verify written data.
    #[serde(default)]
    pub verify: bool,
    /// Reset the chip after a successful write (default: true).
    pub reset_after: Option<bool>,
    /// Accepted chip family, "ESP32-S3" when unset.
    pub chip_family: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Port selection settings.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash defaults.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load the global config, then the local one on top of it.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global);
            }
        }

        if let Some(local) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                return None;
            },
        };

        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse TOML config {}: {e}", path.display());
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "s3flash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge `other` on top of this config.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        for device in other.port.usb_device {
            if !self.port.usb_device.contains(&device) {
                self.port.usb_device.push(device);
            }
        }

        if other.flash.erase_before_write {
            self.flash.erase_before_write = true;
        }
        if other.flash.verify {
            self.flash.verify = true;
        }
        if other.flash.reset_after.is_some() {
            self.flash.reset_after = other.flash.reset_after;
        }
        if other.flash.chip_family.is_some() {
            self.flash.chip_family = other.flash.chip_family;
        }
    }

    /// Whether `vid`/`pid` was remembered before.
    pub fn knows_usb_device(&self, vid: u16, pid: u16) -> bool {
        self.port.usb_device.iter().any(|d| d.matches(vid, pid))
    }

    /// Remember a USB device for future auto-selection.
    ///
    /// Writes to the local file when one exists, otherwise to the global one.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        if self.knows_usb_device(vid, pid) {
            return Ok(());
        }

        let path = if Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_CONFIG)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG)
        };

        self.save_usb_device(&path, UsbDevice { vid, pid })
    }

    fn save_usb_device(&mut self, path: &Path, device: UsbDevice) -> anyhow::Result<()> {
        // Keep whatever else the file already holds
        let mut on_disk = Self::load_from_file(path).unwrap_or_default();
        on_disk.port.usb_device.push(device.clone());
        self.port.usb_device.push(device);

        fs::write(path, toml::to_string_pretty(&on_disk)?)?;
        info!("Saved USB device to {}", path.display());
        Ok(())
    }
}
