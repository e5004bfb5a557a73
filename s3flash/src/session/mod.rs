//! Session orchestration.
//!
//! A session is one lifecycle from connect to disconnect:
//!
//! ```text
//!  Disconnected --connect--> Connecting --ok--> Connected
//!       ^                        |                | flash / reset
//!       |                      fail               v
//!       +---- disconnect ------ Error <--fail-- Flashing / Resetting
//! ```
//!
//! Connect failures settle back in `Disconnected`; flash and reset failures
//! settle back in `Connected`. `disconnect` is accepted from every state.

mod controller;
mod event;
mod job;
mod state;

pub use {
    controller::{ControllerBuilder, ControllerConfig, SessionController},
    event::{LogEntry, SessionEvent, SessionObserver},
    job::{DEFAULT_ADDRESS, FlashJob, FlashReport},
    state::{Action, ActionSet, Indicator, SessionState},
};
