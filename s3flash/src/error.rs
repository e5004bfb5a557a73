//! Error types for s3flash.

use std::io;
use thiserror::Error;

use crate::session::{Action, SessionState};

/// Result type for s3flash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for s3flash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No port was granted (selection cancelled, permission denied, open failed).
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The engine could not synchronize with the bootloader.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The engine could not identify the attached chip.
    #[error("Chip detection failed: {0}")]
    Detection(String),

    /// The detected chip is not part of the allowed family.
    #[error("{expected} only. Detected: {detected}")]
    UnsupportedChip {
        /// Chip name reported by the engine.
        detected: String,
        /// Family the validator accepts.
        expected: String,
    },

    /// Flash erase failed.
    #[error("Erase failed: {0}")]
    Erase(String),

    /// Flash write failed, possibly after a partial transfer.
    #[error("Write failed: {0}")]
    Write(String),

    /// Every available reset mechanism failed.
    #[error("Reset failed: {0}")]
    Reset(String),

    /// Closing the transport failed.
    #[error("Close failed: {0}")]
    Close(String),

    /// Another operation is in flight.
    #[error("Cannot {action} while {state}")]
    Busy {
        /// Rejected action.
        action: Action,
        /// State that rejected it.
        state: SessionState,
    },

    /// The action is not legal in the current state.
    #[error("Cannot {action} while {state}")]
    InvalidState {
        /// Rejected action.
        action: Action,
        /// State that rejected it.
        state: SessionState,
    },

    /// A flash job was created without any image bytes.
    #[error("Firmware image is empty")]
    EmptyImage,

    /// The session was torn down while the operation was in flight.
    #[error("Session was closed during {0}")]
    Cancelled(Action),

    /// Unsupported operation or capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// How far the consequences of an error reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The session is torn down to `Disconnected`.
    Session,
    /// The flash job is discarded; the session stays connected.
    Job,
    /// Only the attempted action failed.
    Action,
    /// Recovered where it happened, never surfaced as a failure.
    Local,
}

impl Error {
    /// Classify this error by how far it propagates.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::DeviceUnavailable(_)
            | Self::Handshake(_)
            | Self::Detection(_)
            | Self::UnsupportedChip { .. }
            | Self::Cancelled(_) => ErrorScope::Session,
            Self::Erase(_) | Self::Write(_) | Self::EmptyImage => ErrorScope::Job,
            Self::Close(_) => ErrorScope::Local,
            _ => ErrorScope::Action,
        }
    }

    /// Whether the error was a rejection by the action guard.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::InvalidState { .. })
    }
}
