//! Serial port discovery and USB bridge classification.
//!
//! ESP32-S3 boards show up either through their built-in USB-Serial/JTAG
//! controller or through a USB-UART bridge on the dev board. Classifying the
//! VID/PID lets port selection put likely candidates first.

use crate::error::{Error, Result};

#[cfg(feature = "native")]
use log::{debug, info, trace};

/// Known USB bridge/device kinds found on ESP32 boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Espressif built-in USB-Serial/JTAG (ESP32-S3, -C3, -C6, ...).
    EspressifUsb,
    /// Silicon Labs CP210x USB-to-UART bridge.
    Cp210x,
    /// WCH CH340/CH341/CH9102 USB-to-UART bridge.
    Ch34x,
    /// FTDI FT232/FT2232 USB-to-UART bridge.
    Ftdi,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs. An empty PID list matches every product of the vendor.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x303A, &[], DeviceKind::EspressifUsb),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], DeviceKind::Cp210x),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x55D3, 0x55D4],
        DeviceKind::Ch34x,
    ),
    (0x0403, &[0x6001, 0x6010, 0x6014, 0x6015], DeviceKind::Ftdi),
];

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, device) in KNOWN_USB_DEVICES {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EspressifUsb => "Espressif USB-Serial/JTAG",
            Self::Cp210x => "CP210x",
            Self::Ch34x => "CH34x/CH9102",
            Self::Ftdi => "FTDI",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this is a recognised device kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A discovered serial port with its USB metadata.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified device kind.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_kind"))]
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

#[cfg(feature = "serde")]
fn serialize_kind<S: serde::Serializer>(kind: &DeviceKind, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(kind.name())
}

impl DetectedPort {
    /// A port with nothing known about it besides its name.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    /// Short label for menus and listings.
    pub fn label(&self) -> String {
        let device_info = if self.device.is_known() {
            format!(" [{}]", self.device.name())
        } else if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            format!(" [VID:{vid:04X} PID:{pid:04X}]")
        } else {
            String::new()
        };

        let product_info = self
            .product
            .as_ref()
            .map(|p| format!(" - {p}"))
            .unwrap_or_default();

        format!("{}{}{}", self.name, device_info, product_info)
    }
}

/// Detect all available serial ports with metadata.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort::unknown(port_info.port_name.clone());

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }

                result.push(detected);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        },
    }

    result
}

/// Detect all available serial ports (no native support compiled in).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the most likely ESP32 port: built-in USB first, then known bridges.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    pick_port(detect_ports())
}

/// Port auto-detection is unavailable without native support.
#[cfg(not(feature = "native"))]
pub fn auto_detect_port() -> Result<DetectedPort> {
    Err(Error::Unsupported(
        "Port enumeration requires the `native` feature".to_string(),
    ))
}

fn pick_port(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    if let Some(port) = ports
        .iter()
        .find(|p| p.device == DeviceKind::EspressifUsb)
    {
        #[cfg(feature = "native")]
        info!("Auto-detected Espressif USB device: {}", port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.device.is_known()) {
        #[cfg(feature = "native")]
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
        return Ok(port.clone());
    }

    ports
        .into_iter()
        .next()
        .ok_or_else(|| Error::DeviceUnavailable("no serial ports found".into()))
}
