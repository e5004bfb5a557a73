//! Detected chip information and the family allow-list.
//!
//! The session only ever talks to one chip family. Whatever the engine
//! reports is matched against that family before the session is considered
//! connected.

use std::fmt;

use crate::error::{Error, Result};

/// Chip family accepted by default.
pub const DEFAULT_FAMILY: &str = "ESP32-S3";

/// Baud rates offered for the transfer phase.
pub const SUPPORTED_BAUDS: &[u32] = &[115_200, 230_400, 460_800, 921_600];

/// Identification reported by the flasher engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChipInfo {
    /// Chip name, e.g. `ESP32-S3`.
    pub name: String,
    /// Longer description (revision, features), if the engine provides one.
    pub description: Option<String>,
}

impl ChipInfo {
    /// Create chip info with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Decides whether a detected chip belongs to the allowed family.
#[derive(Debug, Clone)]
pub struct ChipValidator {
    family: String,
}

impl ChipValidator {
    /// Create a validator for the given family name.
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
        }
    }

    /// The family this validator accepts.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Case-insensitive substring match of `chip_id` against the family.
    pub fn accepts(&self, chip_id: &str) -> bool {
        chip_id
            .to_lowercase()
            .contains(&self.family.to_lowercase())
    }

    /// Accept the chip or produce an [`Error::UnsupportedChip`].
    pub fn validate(&self, chip: &ChipInfo) -> Result<()> {
        if self.accepts(&chip.name) {
            Ok(())
        } else {
            Err(Error::UnsupportedChip {
                detected: chip.name.clone(),
                expected: self.family.clone(),
            })
        }
    }
}

impl Default for ChipValidator {
    fn default() -> Self {
        Self::new(DEFAULT_FAMILY)
    }
}
