//! Flasher engine contract.
//!
//! The device programming protocol (bootloader sync, stub upload, sector
//! encoding, compression) lives behind [`FlasherEngine`]. The session
//! controller drives one engine per session and never touches the wire
//! itself. A fresh engine is built by an [`EngineFactory`] on every connect.

use bitflags::bitflags;

use crate::{
    chip::ChipInfo,
    error::{Error, Result},
    transport::Transport,
};

bitflags! {
    /// Optional operations an engine supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u8 {
        /// [`FlasherEngine::hard_reset`] is implemented.
        const HARD_RESET = 1 << 0;
        /// The engine checks written data against the image when
        /// [`WriteOptions::verify`] is set.
        const VERIFY = 1 << 1;
    }
}

/// Options passed through to [`FlasherEngine::write_flash`].
///
/// The image is written as-is; its header (flash size, mode, frequency) is
/// never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Ask the engine to verify what it wrote. Only set for engines that
    /// advertise [`Capabilities::VERIFY`].
    pub verify: bool,
}

impl WriteOptions {
    /// Enable engine-side verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// A device programming engine bound to one open transport.
pub trait FlasherEngine: Send {
    /// Optional operations this engine supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Synchronize with the bootloader.
    ///
    /// Returns the chip when the handshake already identified it; otherwise
    /// the controller falls back to [`FlasherEngine::detect_chip`].
    fn connect_and_handshake(&mut self) -> Result<Option<ChipInfo>>;

    /// Identify the attached chip.
    fn detect_chip(&mut self) -> Result<ChipInfo>;

    /// Erase the whole flash.
    fn erase_flash(&mut self) -> Result<()>;

    /// Write `image` at `address`, reporting `(written, total)` as it goes.
    fn write_flash(
        &mut self,
        image: &[u8],
        address: u32,
        options: &WriteOptions,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()>;

    /// Restart the chip through the engine's own reset sequence.
    fn hard_reset(&mut self) -> Result<()> {
        Err(Error::Unsupported("engine has no hard reset".into()))
    }

    /// The transport the engine is bound to.
    fn transport(&mut self) -> &mut dyn Transport;

    /// Release the transport.
    fn close(&mut self) -> Result<()> {
        self.transport().close()
    }
}

/// Builds a fresh engine for each session.
pub trait EngineFactory: Send + Sync {
    /// Bind a new engine to `transport`, using `baud_rate` for the transfer.
    fn create(&self, transport: Box<dyn Transport>, baud_rate: u32) -> Box<dyn FlasherEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(Box<dyn Transport>, u32) -> Box<dyn FlasherEngine> + Send + Sync,
{
    fn create(&self, transport: Box<dyn Transport>, baud_rate: u32) -> Box<dyn FlasherEngine> {
        self(transport, baud_rate)
    }
}
