//! Reset fallback chain.
//!
//! Mechanisms are tried in order until one succeeds:
//!
//! 1. the engine's own hard reset, when [`Capabilities::HARD_RESET`] is set;
//! 2. an RTS pulse on the transport, when it can drive control lines;
//! 3. otherwise the operator has to press the reset button.
//!
//! Running out of mechanisms without trying any is not a failure. Trying and
//! failing every one is.

use std::{fmt, thread, time::Duration};

use log::{debug, warn};

use crate::{
    engine::{Capabilities, FlasherEngine},
    error::{Error, Result},
    transport::Signals,
};

/// Default time RTS is held asserted.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(100);

/// Attempts at releasing the lines after a pulse.
const RELEASE_ATTEMPTS: usize = 3;

/// A way of restarting the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMechanism {
    /// The engine's reset command sequence.
    EngineHardReset,
    /// Assert then release RTS on the transport.
    SignalPulse,
}

impl fmt::Display for ResetMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineHardReset => f.write_str("engine hard reset"),
            Self::SignalPulse => f.write_str("RTS pulse"),
        }
    }
}

/// One mechanism tried and what came of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetAttempt {
    /// The mechanism.
    pub mechanism: ResetMechanism,
    /// `Err` carries the failure text.
    pub result: std::result::Result<(), String>,
}

impl ResetAttempt {
    /// Whether this attempt restarted the chip.
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Display for ResetAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(()) => write!(f, "Reset via {}.", self.mechanism),
            Err(e) => write!(f, "Reset via {} failed: {e}", self.mechanism),
        }
    }
}

/// Final result of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The chip was restarted by this mechanism.
    Reset(ResetMechanism),
    /// No mechanism is available; the operator must reset the board by hand.
    ManualActionRequired,
    /// Every available mechanism failed; carries the last failure.
    Failed(String),
}

impl fmt::Display for ResetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset(m) => write!(f, "Device reset ({m})."),
            Self::ManualActionRequired => {
                f.write_str("Reset not supported on this board. Press the RESET button manually.")
            },
            Self::Failed(e) => write!(f, "Reset failed: {e}"),
        }
    }
}

/// Everything the chain did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    /// Attempts in the order they were made.
    pub attempts: Vec<ResetAttempt>,
    /// How it ended.
    pub outcome: ResetOutcome,
}

/// Tries the reset mechanisms in order.
#[derive(Debug, Clone, Copy)]
pub struct ResetStrategy {
    pulse: Duration,
}

impl Default for ResetStrategy {
    fn default() -> Self {
        Self {
            pulse: DEFAULT_PULSE,
        }
    }
}

impl ResetStrategy {
    /// A strategy holding RTS for `pulse`.
    pub fn new(pulse: Duration) -> Self {
        Self { pulse }
    }

    /// How long RTS is held asserted.
    pub fn pulse(&self) -> Duration {
        self.pulse
    }

    /// Run the chain against `engine` and its transport.
    pub fn run(&self, engine: &mut dyn FlasherEngine) -> ResetReport {
        let mut attempts = Vec::new();

        if engine.capabilities().contains(Capabilities::HARD_RESET) {
            let attempt = Self::attempt(ResetMechanism::EngineHardReset, engine.hard_reset());
            let done = attempt.succeeded();
            attempts.push(attempt);
            if done {
                return Self::finish(attempts, ResetOutcome::Reset(ResetMechanism::EngineHardReset));
            }
        }

        if engine.transport().supports_signals() {
            let attempt = Self::attempt(ResetMechanism::SignalPulse, self.pulse_rts(engine));
            let done = attempt.succeeded();
            attempts.push(attempt);
            if done {
                return Self::finish(attempts, ResetOutcome::Reset(ResetMechanism::SignalPulse));
            }
        }

        let outcome = match attempts.last() {
            Some(ResetAttempt {
                result: Err(e), ..
            }) => ResetOutcome::Failed(e.clone()),
            _ => ResetOutcome::ManualActionRequired,
        };
        Self::finish(attempts, outcome)
    }

    /// Assert, hold, release. The release is attempted even when asserting
    /// failed, and retried, so EN is never left held low. The first error
    /// wins.
    fn pulse_rts(&self, engine: &mut dyn FlasherEngine) -> Result<()> {
        let transport = engine.transport();
        let asserted = transport.set_signals(Signals::RTS_ASSERTED);
        if asserted.is_ok() {
            thread::sleep(self.pulse);
        }

        let mut release_err = None;
        for _ in 0..RELEASE_ATTEMPTS {
            match transport.set_signals(Signals::RELEASED) {
                Ok(()) => break,
                Err(e) => {
                    warn!("Releasing control lines failed: {e}");
                    if release_err.is_none() {
                        release_err = Some(e);
                    }
                },
            }
        }

        asserted?;
        release_err.map_or(Ok(()), Err)
    }

    fn attempt(mechanism: ResetMechanism, result: Result<()>) -> ResetAttempt {
        let attempt = ResetAttempt {
            mechanism,
            result: result.map_err(|e| match e {
                Error::Reset(msg) => msg,
                other => other.to_string(),
            }),
        };
        if attempt.succeeded() {
            debug!("{attempt}");
        } else {
            warn!("{attempt}");
        }
        attempt
    }

    fn finish(attempts: Vec<ResetAttempt>, outcome: ResetOutcome) -> ResetReport {
        ResetReport { attempts, outcome }
    }
}
