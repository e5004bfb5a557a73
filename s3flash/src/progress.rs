//! Transfer progress formatting.
//!
//! The engine's write loop reports `(written, total)` pairs at whatever rate it
//! likes; [`ProgressReporter::format`] turns each pair into the value shown on
//! the progress bar and the status line. It allocates only the label.

use std::fmt;

/// A formatted progress value.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Percentage in `0.0..=100.0`.
    pub percent: f64,
    /// Status text, e.g. `Flashing... 25.0%`.
    pub label: String,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Converts byte counts into a clamped percentage and a status label.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressReporter;

impl ProgressReporter {
    /// Clamped percentage of `written` over `total`; `0.0` when `total == 0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(written: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (written as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Format a `(written, total)` pair.
    #[must_use]
    pub fn format(written: usize, total: usize) -> Progress {
        let percent = Self::percent(written, total);
        Progress {
            percent,
            label: format!("Flashing... {percent:.1}%"),
        }
    }
}
