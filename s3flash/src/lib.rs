//! # s3flash
//!
//! A library for flashing firmware onto ESP32-S3 chips over a serial port.
//!
//! The crate does not speak the bootloader protocol itself. It orchestrates a
//! flashing session around a pluggable [`FlasherEngine`]:
//!
//! - opening and releasing the port ([`DeviceGate`])
//! - rejecting chips outside the ESP32-S3 family ([`ChipValidator`])
//! - erase and write with live progress ([`ProgressReporter`])
//! - resetting the chip with fallbacks ([`ResetStrategy`])
//! - keeping connect/flash/reset mutually exclusive ([`SessionController`])
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use s3flash::{DeviceGate, EngineFactory, FlashJob, SessionController};
//!
//! fn run(gate: DeviceGate, engines: impl EngineFactory + 'static) -> s3flash::Result<()> {
//!     let controller = SessionController::builder(gate, engines).build();
//!
//!     let chip = controller.connect()?;
//!     println!("Connected to {chip}");
//!
//!     let image = std::fs::read("firmware.bin")?;
//!     controller.flash(FlashJob::new(image).with_erase(true))?;
//!     controller.reset()?;
//!     controller.disconnect();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chip;
pub mod device;
pub mod engine;
pub mod error;
pub mod gate;
pub mod progress;
pub mod reset;
pub mod session;
pub mod transport;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use {gate::NativePortSelector, transport::NativeTransport};
pub use {
    chip::{ChipInfo, ChipValidator, DEFAULT_FAMILY, SUPPORTED_BAUDS},
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports},
    engine::{Capabilities, EngineFactory, FlasherEngine, WriteOptions},
    error::{Error, ErrorScope, Result},
    gate::{DeviceGate, PortSelector},
    progress::{Progress, ProgressReporter},
    reset::{ResetAttempt, ResetMechanism, ResetOutcome, ResetReport, ResetStrategy},
    session::{
        Action, ActionSet, ControllerBuilder, ControllerConfig, FlashJob, FlashReport, Indicator,
        LogEntry, SessionController, SessionEvent, SessionObserver, SessionState,
    },
    transport::{SerialConfig, Signals, Transport},
};
