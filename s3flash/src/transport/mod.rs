//! Transport abstraction for the open communication channel.
//!
//! A [`Transport`] is the handle a session owns from connect to disconnect.
//! The orchestrator itself never reads or writes bytes; it only needs the
//! handle's identity, its optional control lines and a way to close it. Byte
//! I/O is exposed for engine adapters that speak the device protocol over it.
//!
//! ```text
//! +------------------+
//! | SessionController|
//! +--------+---------+
//!          | owns (via the engine bound to it)
//!          v
//! +--------+---------+     +------------------+
//! |  Transport trait | <-- |  FlasherEngine   |
//! +--------+---------+     +------------------+
//!          |
//!          v
//! +--------+---------+
//! | NativeTransport  |
//! |   (serialport)   |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

#[cfg(feature = "native")]
pub use native::{NativeHandle, NativeTransport};

/// Serial port configuration used when opening a transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate the port is opened at.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(3000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Levels for the modem control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// Data Terminal Ready.
    pub dtr: bool,
    /// Request To Send.
    pub rts: bool,
}

impl Signals {
    /// Both lines released.
    pub const RELEASED: Self = Self {
        dtr: false,
        rts: false,
    };

    /// Only RTS asserted. On most ESP32 boards RTS drives the EN (reset) pin.
    pub const RTS_ASSERTED: Self = Self {
        dtr: false,
        rts: true,
    };
}

/// The open communication channel to the device.
pub trait Transport: Read + Write + Send {
    /// Port name/path.
    fn name(&self) -> &str;

    /// Current baud rate.
    fn baud_rate(&self) -> u32;

    /// Change the baud rate.
    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} cannot change its baud rate",
            self.name()
        )))
    }

    /// Set the read/write timeout.
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether [`Transport::set_signals`] can drive the control lines.
    fn supports_signals(&self) -> bool {
        false
    }

    /// Drive DTR and RTS.
    fn set_signals(&mut self, _signals: Signals) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} has no control lines",
            self.name()
        )))
    }

    /// Whether the handle is still open.
    fn is_open(&self) -> bool;

    /// Close the handle. Closing an already closed handle is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Hand the underlying OS port to an engine that drives it directly.
    ///
    /// After this returns `Some`, the transport no longer owns a port.
    #[cfg(feature = "native")]
    fn take_native(&mut self) -> Option<NativeHandle> {
        None
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0", 921_600).with_timeout(Duration::from_secs(5));

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 921_600);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_reset_pulse_signal_levels() {
        assert!(Signals::RTS_ASSERTED.rts);
        assert!(!Signals::RTS_ASSERTED.dtr);
        assert_eq!(Signals::default(), Signals::RELEASED);
    }
}
