//! Native serial transport using the `serialport` crate.

use {
    crate::{
        error::Result,
        transport::{SerialConfig, Signals, Transport},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, SerialPort},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// The platform's concrete serial port type.
#[cfg(unix)]
pub type NativeHandle = serialport::TTYPort;

/// The platform's concrete serial port type.
#[cfg(windows)]
pub type NativeHandle = serialport::COMPort;

/// Serial transport backed by an OS port.
pub struct NativeTransport {
    port: Option<NativeHandle>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativeTransport {
    /// Open a serial port with the given configuration (8N1, no flow control).
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open_native()?;

        debug!("Opened {} at {} baud", config.port_name, config.baud_rate);

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }

    fn closed() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
    }
}

impl Transport for NativeTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_baud_rate(baud_rate)?;
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn supports_signals(&self) -> bool {
        self.port.is_some()
    }

    fn set_signals(&mut self, signals: Signals) -> Result<()> {
        trace!("Setting DTR={} RTS={}", signals.dtr, signals.rts);
        let port = self.port.as_mut().ok_or_else(Self::closed)?;
        port.write_data_terminal_ready(signals.dtr)?;
        port.write_request_to_send(signals.rts)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the OS port
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }

    fn take_native(&mut self) -> Option<NativeHandle> {
        self.port.take()
    }
}

impl Read for NativeTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativeTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed)
            .and_then(std::io::Write::flush)
    }
}
