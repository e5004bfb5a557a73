//! Flasher engine backed by espflash.
//!
//! espflash owns the OS port once the bootloader handshake starts, so the
//! session's transport hands its native handle over and the engine keeps the
//! resulting [`Flasher`] until the session closes it.

use {
    espflash::{
        connection::{Connection, ResetAfterOperation, ResetBeforeOperation},
        flasher::Flasher,
        target::ProgressCallbacks,
    },
    log::{debug, trace},
    s3flash::{
        Capabilities, ChipInfo, Error, FlasherEngine, Result, Signals, Transport, WriteOptions,
    },
    serialport::{SerialPortType, UsbPortInfo},
    std::io::{Read, Write},
};

/// The session transport, plus the espflash connection once it took the port.
struct FlasherPort {
    transport: Box<dyn Transport>,
    flasher: Option<Flasher>,
}

impl Read for FlasherPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.transport.read(buf)
    }
}

impl Write for FlasherPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.transport.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.transport.flush()
    }
}

impl Transport for FlasherPort {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn baud_rate(&self) -> u32 {
        self.transport.baud_rate()
    }

    // After the handover the control lines belong to espflash
    fn supports_signals(&self) -> bool {
        self.flasher.is_none() && self.transport.supports_signals()
    }

    fn set_signals(&mut self, signals: Signals) -> Result<()> {
        self.transport.set_signals(signals)
    }

    fn is_open(&self) -> bool {
        self.flasher.is_some() || self.transport.is_open()
    }

    fn close(&mut self) -> Result<()> {
        if self.flasher.take().is_some() {
            debug!("Released espflash connection on {}", self.name());
        }
        self.transport.close()
    }
}

/// Drives the ESP32 ROM bootloader through espflash.
pub(crate) struct EspflashEngine {
    port: FlasherPort,
    baud_rate: u32,
    /// espflash fixes verification when it connects.
    verify: bool,
}

impl EspflashEngine {
    pub(crate) fn new(transport: Box<dyn Transport>, baud_rate: u32, verify: bool) -> Self {
        Self {
            port: FlasherPort {
                transport,
                flasher: None,
            },
            baud_rate,
            verify,
        }
    }

    fn flasher(&mut self) -> Result<&mut Flasher> {
        self.port
            .flasher
            .as_mut()
            .ok_or_else(|| Error::Unsupported("bootloader handshake has not run".into()))
    }
}

/// USB metadata espflash uses to pick a reset sequence.
fn usb_info(port_name: &str) -> UsbPortInfo {
    serialport::available_ports()
        .ok()
        .and_then(|ports| ports.into_iter().find(|p| p.port_name == port_name))
        .and_then(|p| match p.port_type {
            SerialPortType::UsbPort(info) => Some(info),
            _ => None,
        })
        .unwrap_or(UsbPortInfo {
            vid: 0,
            pid: 0,
            serial_number: None,
            manufacturer: None,
            product: None,
        })
}

/// `esp32s3` -> `ESP32-S3`.
fn chip_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    match upper.strip_prefix("ESP32") {
        Some(rest) if !rest.is_empty() && !rest.starts_with('-') => format!("ESP32-{rest}"),
        _ => upper,
    }
}

fn describe(flasher: &mut Flasher) -> Result<ChipInfo> {
    let info = flasher
        .device_info()
        .map_err(|e| Error::Detection(e.to_string()))?;

    let mut description = match info.revision {
        Some((major, minor)) => format!("revision v{major}.{minor}"),
        None => "revision unknown".to_string(),
    };
    description.push_str(&format!(", {} flash", info.flash_size));
    if !info.features.is_empty() {
        description.push_str(&format!(", {}", info.features.join(", ")));
    }

    Ok(ChipInfo::new(chip_name(&info.chip.to_string())).with_description(description))
}

/// Turns espflash's block counts into byte counts for the session.
struct ByteProgress<'a> {
    image_len: usize,
    blocks: usize,
    report: &'a mut dyn FnMut(usize, usize),
}

impl ProgressCallbacks for ByteProgress<'_> {
    fn init(&mut self, addr: u32, total: usize) {
        trace!("Writing {total} blocks at {addr:#x}");
        self.blocks = total;
        (self.report)(0, self.image_len);
    }

    fn update(&mut self, current: usize) {
        if self.blocks > 0 {
            let written = current.min(self.blocks) * self.image_len / self.blocks;
            (self.report)(written, self.image_len);
        }
    }

    fn verifying(&mut self) {
        debug!("Verifying written data");
    }

    fn finish(&mut self, _skipped: bool) {
        (self.report)(self.image_len, self.image_len);
    }
}

impl FlasherEngine for EspflashEngine {
    fn capabilities(&self) -> Capabilities {
        if self.verify {
            Capabilities::HARD_RESET | Capabilities::VERIFY
        } else {
            Capabilities::HARD_RESET
        }
    }

    fn connect_and_handshake(&mut self) -> Result<Option<ChipInfo>> {
        let name = self.port.name().to_string();
        let native = self
            .port
            .transport
            .take_native()
            .ok_or_else(|| Error::Handshake(format!("{name} is not a native serial port")))?;

        let connection = Connection::new(
            native,
            usb_info(&name),
            ResetAfterOperation::HardReset,
            ResetBeforeOperation::DefaultReset,
            self.baud_rate,
        );
        // Always write, even when the flash already holds the image
        let mut flasher = Flasher::connect(
            connection,
            true,
            self.verify,
            false,
            None,
            Some(self.baud_rate),
        )
        .map_err(|e| Error::Handshake(e.to_string()))?;

        let chip = describe(&mut flasher)?;
        self.port.flasher = Some(flasher);
        Ok(Some(chip))
    }

    fn detect_chip(&mut self) -> Result<ChipInfo> {
        describe(self.flasher()?)
    }

    fn erase_flash(&mut self) -> Result<()> {
        self.flasher()?
            .erase_flash()
            .map_err(|e| Error::Erase(e.to_string()))
    }

    fn write_flash(
        &mut self,
        image: &[u8],
        address: u32,
        options: &WriteOptions,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        if options.verify != self.verify {
            return Err(Error::Unsupported(format!(
                "verification was {} when the bootloader connected",
                if self.verify { "enabled" } else { "disabled" }
            )));
        }
        debug!("Writing {} bytes at {address:#x}", image.len());
        let mut callbacks = ByteProgress {
            image_len: image.len(),
            blocks: 0,
            report: progress,
        };
        self.flasher()?
            .write_bin_to_flash(address, image, &mut callbacks)
            .map_err(|e| Error::Write(e.to_string()))
    }

    fn hard_reset(&mut self) -> Result<()> {
        self.flasher()?
            .connection()
            .reset()
            .map_err(|e| Error::Reset(e.to_string()))
    }

    fn transport(&mut self) -> &mut dyn Transport {
        &mut self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdlePort;

    impl Read for IdlePort {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for IdlePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for IdlePort {
        fn name(&self) -> &str {
            "idle"
        }

        fn baud_rate(&self) -> u32 {
            115_200
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_verify_capability_follows_setting() {
        let plain = EspflashEngine::new(Box::new(IdlePort), 460_800, false);
        assert!(plain.capabilities().contains(Capabilities::HARD_RESET));
        assert!(!plain.capabilities().contains(Capabilities::VERIFY));

        let verifying = EspflashEngine::new(Box::new(IdlePort), 460_800, true);
        assert!(verifying.capabilities().contains(Capabilities::VERIFY));
    }

    #[test]
    fn test_write_rejects_verify_mismatch() {
        let mut engine = EspflashEngine::new(Box::new(IdlePort), 460_800, false);
        let mut progress = |_: usize, _: usize| {};
        let err = engine
            .write_flash(&[0xE9; 16], 0, &WriteOptions::default().with_verify(true), &mut progress)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(ref m) if m.contains("disabled")));
    }

    #[test]
    fn test_chip_name_normalised() {
        assert_eq!(chip_name("esp32s3"), "ESP32-S3");
        assert_eq!(chip_name("esp32c3"), "ESP32-C3");
        assert_eq!(chip_name("ESP32-S3"), "ESP32-S3");
        assert_eq!(chip_name("esp32"), "ESP32");
    }

    #[test]
    fn test_byte_progress_scales_blocks() {
        let mut seen = Vec::new();
        let mut report = |written: usize, total: usize| seen.push((written, total));
        let mut progress = ByteProgress {
            image_len: 4096,
            blocks: 0,
            report: &mut report,
        };
        progress.init(0, 4);
        progress.update(1);
        progress.update(4);
        progress.finish(false);
        assert_eq!(seen, vec![(0, 4096), (1024, 4096), (4096, 4096), (4096, 4096)]);
    }
}
