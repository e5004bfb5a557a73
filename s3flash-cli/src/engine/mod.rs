//! Engine selection for the CLI.
//!
//! Builds with the `espflash` feature drive the ROM bootloader through the
//! espflash crate. Other builds still manage ports, sessions and resets, but
//! their engine refuses the handshake.

#[cfg(feature = "espflash")]
mod esp;

use s3flash::{ChipInfo, EngineFactory, Error, FlasherEngine, Result, Transport, WriteOptions};

/// Factory handed to every session the CLI builds.
///
/// `verify` turns on engine-side verification of every write.
pub(crate) fn engine_factory(verify: bool) -> impl EngineFactory {
    move |transport: Box<dyn Transport>, baud_rate: u32| -> Box<dyn FlasherEngine> {
        #[cfg(feature = "espflash")]
        {
            Box::new(esp::EspflashEngine::new(transport, baud_rate, verify))
        }
        #[cfg(not(feature = "espflash"))]
        {
            log::debug!(
                "No protocol engine compiled in, ignoring {baud_rate} baud (verify: {verify})"
            );
            Box::new(NoProtocolEngine { transport })
        }
    }
}

/// Holds the port but cannot talk to the bootloader.
#[cfg_attr(feature = "espflash", allow(dead_code))]
pub(crate) struct NoProtocolEngine {
    transport: Box<dyn Transport>,
}

#[cfg_attr(feature = "espflash", allow(dead_code))]
impl NoProtocolEngine {
    fn unsupported() -> Error {
        Error::Unsupported(
            "this build has no flashing protocol; rebuild with `--features espflash`".into(),
        )
    }
}

impl FlasherEngine for NoProtocolEngine {
    fn connect_and_handshake(&mut self) -> Result<Option<ChipInfo>> {
        Err(Self::unsupported())
    }

    fn detect_chip(&mut self) -> Result<ChipInfo> {
        Err(Self::unsupported())
    }

    fn erase_flash(&mut self) -> Result<()> {
        Err(Self::unsupported())
    }

    fn write_flash(
        &mut self,
        _image: &[u8],
        _address: u32,
        _options: &WriteOptions,
        _progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        Err(Self::unsupported())
    }

    fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}
