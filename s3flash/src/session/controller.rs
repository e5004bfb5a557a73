//! The session state machine.
//!
//! [`SessionController`] sequences connect, flash, reset and disconnect over
//! one transport at a time. It is cheap to clone and safe to share between
//! threads so that a UI thread can call [`SessionController::disconnect`]
//! while another thread is blocked inside an engine call.
//!
//! # Locking
//!
//! Session bookkeeping lives behind one mutex that is only held for short
//! updates. The engine sits behind its own mutex, held by whichever
//! operation is talking to the device. Code never waits for the engine while
//! holding the bookkeeping lock, and observers are called after it is
//! released.
//!
//! # Late results
//!
//! Every connect starts a new generation. Disconnecting bumps it again. An
//! operation that finishes after its generation ended discards its result
//! and returns [`Error::Cancelled`]; the engine it was using is closed when
//! the last reference to it goes away.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, info};

use crate::{
    chip::{ChipInfo, ChipValidator, DEFAULT_FAMILY},
    engine::{Capabilities, EngineFactory, FlasherEngine, WriteOptions},
    error::{Error, Result},
    gate::DeviceGate,
    progress::ProgressReporter,
    reset::{DEFAULT_PULSE, ResetOutcome, ResetStrategy},
    session::{
        event::{LogEntry, SessionEvent, SessionObserver},
        job::{FlashJob, FlashReport},
        state::{Action, ActionSet, Indicator, SessionState},
    },
};

/// Construction-time settings for a controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Baud rate handed to the engine.
    pub baud_rate: u32,
    /// Chip family the validator accepts.
    pub family: String,
    /// How long RTS is held during a signal-line reset.
    pub reset_pulse: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            family: DEFAULT_FAMILY.to_string(),
            reset_pulse: DEFAULT_PULSE,
        }
    }
}

/// Closes the transport when the last reference goes away.
struct BoundEngine(Box<dyn FlasherEngine>);

impl Drop for BoundEngine {
    fn drop(&mut self) {
        DeviceGate::release(self.0.as_mut());
    }
}

type EngineCell = Arc<Mutex<BoundEngine>>;

struct Session {
    engine: EngineCell,
    chip: Option<ChipInfo>,
}

struct Inner {
    state: SessionState,
    session: Option<Session>,
    last_error: Option<String>,
    status: String,
    progress: f64,
    log: Vec<LogEntry>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            session: None,
            last_error: None,
            status: SessionState::Disconnected.status().to_string(),
            progress: 0.0,
            log: Vec::new(),
        }
    }

    fn transition(&mut self, state: SessionState, status: &str, events: &mut Vec<SessionEvent>) {
        debug!("{} -> {state}", self.state);
        self.state = state;
        self.status = status.to_string();
        events.push(SessionEvent::StateChanged {
            state,
            indicator: state.indicator(),
            status: self.status.clone(),
        });
    }

    fn log(&mut self, message: impl Into<String>, events: &mut Vec<SessionEvent>) {
        let entry = LogEntry::now(message);
        info!("{}", entry.message);
        self.log.push(entry.clone());
        events.push(SessionEvent::Log(entry));
    }

    /// Report a failure: log it and pass through `Error` on the way to `settle`.
    fn fail(&mut self, err: &Error, settle: SessionState, events: &mut Vec<SessionEvent>) {
        self.last_error = Some(err.to_string());
        self.log(format!("ERROR: {err}"), events);
        self.transition(SessionState::Error, SessionState::Error.status(), events);
        let status = match settle {
            SessionState::Connected => SessionState::Error.status(),
            other => other.status(),
        };
        self.transition(settle, status, events);
    }

    fn set_progress(&mut self, written: usize, total: usize, events: &mut Vec<SessionEvent>) {
        let progress = ProgressReporter::format(written, total);
        self.progress = progress.percent;
        self.status.clone_from(&progress.label);
        events.push(SessionEvent::Progress(progress));
    }

    /// Reject `action` unless the current state enables it.
    fn guard(&mut self, action: Action, events: &mut Vec<SessionEvent>) -> Result<()> {
        if self.state.allowed_actions().allows(action) {
            return Ok(());
        }
        if self.state == SessionState::Disconnected {
            self.log("Not connected.", events);
        }
        let state = self.state;
        debug!("Rejected {action} while {state}");
        if state.is_busy() {
            Err(Error::Busy { action, state })
        } else {
            Err(Error::InvalidState { action, state })
        }
    }

    fn engine(&self, action: Action) -> Result<EngineCell> {
        self.session
            .as_ref()
            .map(|s| Arc::clone(&s.engine))
            .ok_or(Error::InvalidState {
                action,
                state: self.state,
            })
    }
}

struct Shared {
    inner: Mutex<Inner>,
    gate: Mutex<DeviceGate>,
    factory: Box<dyn EngineFactory>,
    validator: ChipValidator,
    reset: ResetStrategy,
    baud_rate: u32,
    observer: Box<dyn SessionObserver>,
    generation: AtomicU64,
}

/// Builds a [`SessionController`].
pub struct ControllerBuilder {
    gate: DeviceGate,
    factory: Box<dyn EngineFactory>,
    config: ControllerConfig,
    observer: Box<dyn SessionObserver>,
}

impl ControllerBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver events to `observer`.
    #[must_use]
    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Finish building.
    pub fn build(self) -> SessionController {
        SessionController {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new()),
                gate: Mutex::new(self.gate),
                factory: self.factory,
                validator: ChipValidator::new(self.config.family),
                reset: ResetStrategy::new(self.config.reset_pulse),
                baud_rate: self.config.baud_rate,
                observer: self.observer,
                generation: AtomicU64::new(0),
            }),
        }
    }
}

/// Drives one device session at a time.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keep `err` if it already is of the `kind` variant, otherwise wrap its text.
fn reclassify(err: Error, kind: fn(String) -> Error) -> Error {
    if std::mem::discriminant(&err) == std::mem::discriminant(&kind(String::new())) {
        err
    } else {
        kind(err.to_string())
    }
}

impl SessionController {
    /// Start building a controller around a gate and an engine factory.
    pub fn builder(gate: DeviceGate, factory: impl EngineFactory + 'static) -> ControllerBuilder {
        ControllerBuilder {
            gate,
            factory: Box::new(factory),
            config: ControllerConfig::default(),
            observer: Box::new(()),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        lock(&self.shared.inner).state
    }

    /// Actions the current state enables.
    pub fn allowed_actions(&self) -> ActionSet {
        self.state().allowed_actions()
    }

    /// Connectivity indicator for the current state.
    pub fn indicator(&self) -> Indicator {
        self.state().indicator()
    }

    /// Current status line.
    pub fn status(&self) -> String {
        lock(&self.shared.inner).status.clone()
    }

    /// Last reported transfer progress in percent.
    pub fn progress(&self) -> f64 {
        lock(&self.shared.inner).progress
    }

    /// Chip of the current session.
    pub fn chip(&self) -> Option<ChipInfo> {
        lock(&self.shared.inner)
            .session
            .as_ref()
            .and_then(|s| s.chip.clone())
    }

    /// Most recent failure, cleared by the next successful operation.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.inner).last_error.clone()
    }

    /// Copy of the session log.
    pub fn log(&self) -> Vec<LogEntry> {
        lock(&self.shared.inner).log.clone()
    }

    /// Chip family this controller accepts.
    pub fn family(&self) -> &str {
        self.shared.validator.family()
    }

    /// Open a port, handshake with the bootloader and validate the chip.
    ///
    /// Any failure leaves the controller `Disconnected` with the port closed.
    pub fn connect(&self) -> Result<ChipInfo> {
        let id = self.try_update(|inner, events| {
            inner.guard(Action::Connect, events)?;
            inner.progress = 0.0;
            inner.transition(
                SessionState::Connecting,
                SessionState::Connecting.status(),
                events,
            );
            Ok(self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1)
        })?;

        let transport = match lock(&self.shared.gate).open() {
            Ok(transport) => transport,
            Err(e) => return Err(self.abort_connect(id, e)),
        };

        let engine = self.shared.factory.create(transport, self.shared.baud_rate);
        let cell: EngineCell = Arc::new(Mutex::new(BoundEngine(engine)));
        let attached = self.update(|inner, _| {
            if !self.is_current(id) {
                return false;
            }
            inner.session = Some(Session {
                engine: Arc::clone(&cell),
                chip: None,
            });
            true
        });
        if !attached {
            debug!("Disconnected before the engine was bound");
            return Err(Error::Cancelled(Action::Connect));
        }

        let mut engine = lock(&cell);
        let chip = match Self::identify(engine.0.as_mut()) {
            Ok(chip) => chip,
            Err(e) => {
                DeviceGate::release(engine.0.as_mut());
                return Err(self.abort_connect(id, e));
            },
        };

        self.log_if_current(id, format!("Detected chip: {}", chip.name));
        if let Some(description) = &chip.description {
            self.log_if_current(id, format!("Chip description: {description}"));
        }
        if let Err(e) = self.shared.validator.validate(&chip) {
            DeviceGate::release(engine.0.as_mut());
            return Err(self.abort_connect(id, e));
        }

        self.update(|inner, events| {
            if !self.is_current(id) {
                DeviceGate::release(engine.0.as_mut());
                return Err(Error::Cancelled(Action::Connect));
            }
            if let Some(session) = inner.session.as_mut() {
                session.chip = Some(chip.clone());
            }
            inner.last_error = None;
            inner.transition(
                SessionState::Connected,
                SessionState::Connected.status(),
                events,
            );
            Ok(chip)
        })
    }

    /// Erase (if requested) and write `job`.
    ///
    /// Failures keep the session `Connected` so the job can be retried.
    pub fn flash(&self, job: FlashJob) -> Result<FlashReport> {
        let (id, cell) = self.try_update(|inner, events| {
            inner.guard(Action::Flash, events)?;
            if job.is_empty() {
                inner.log("Please choose a .bin file first.", events);
                return Err(Error::EmptyImage);
            }
            let cell = inner.engine(Action::Flash)?;
            inner.progress = 0.0;
            let label = ProgressReporter::format(0, job.len()).label;
            inner.transition(SessionState::Flashing, &label, events);
            Ok((self.shared.generation.load(Ordering::SeqCst), cell))
        })?;

        let mut engine = lock(&cell);
        let result = self.run_job(id, engine.0.as_mut(), &job);

        self.update(|inner, events| {
            if !self.is_current(id) {
                debug!("Discarding flash result of a closed session");
                return Err(Error::Cancelled(Action::Flash));
            }
            match result {
                Ok(report) => {
                    if inner.progress < 100.0 {
                        inner.set_progress(report.bytes_total, report.bytes_total, events);
                    }
                    inner.log("Flash complete.", events);
                    inner.last_error = None;
                    inner.transition(SessionState::Connected, "Done", events);
                    Ok(report)
                },
                Err(e) => {
                    inner.set_progress(0, job.len(), events);
                    inner.fail(&e, SessionState::Connected, events);
                    Err(e)
                },
            }
        })
    }

    /// Restart the chip through the reset fallback chain.
    ///
    /// Only rejections by the action guard are returned as `Err`; a failed
    /// reset is reported as [`ResetOutcome::Failed`] and the session stays
    /// connected.
    pub fn reset(&self) -> Result<ResetOutcome> {
        let (id, cell) = self.try_update(|inner, events| {
            inner.guard(Action::Reset, events)?;
            let cell = inner.engine(Action::Reset)?;
            inner.transition(
                SessionState::Resetting,
                SessionState::Resetting.status(),
                events,
            );
            Ok((self.shared.generation.load(Ordering::SeqCst), cell))
        })?;

        let mut engine = lock(&cell);
        let report = self.shared.reset.run(engine.0.as_mut());

        self.update(|inner, events| {
            if !self.is_current(id) {
                debug!("Discarding reset result of a closed session");
                return Err(Error::Cancelled(Action::Reset));
            }
            for attempt in &report.attempts {
                inner.log(attempt.to_string(), events);
            }
            match &report.outcome {
                ResetOutcome::Failed(msg) => {
                    inner.fail(&Error::Reset(msg.clone()), SessionState::Connected, events);
                },
                outcome => {
                    inner.log(outcome.to_string(), events);
                    inner.last_error = None;
                    inner.transition(
                        SessionState::Connected,
                        SessionState::Connected.status(),
                        events,
                    );
                },
            }
            Ok(report.outcome)
        })
    }

    /// Release the port and return to `Disconnected`.
    ///
    /// Always succeeds and may be called any number of times, from any
    /// thread, including while another operation is blocked on the device.
    pub fn disconnect(&self) {
        let session = self.update(|inner, events| {
            if inner.state == SessionState::Disconnected && inner.session.is_none() {
                return None;
            }
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            let session = inner.session.take();
            inner.progress = 0.0;
            inner.transition(
                SessionState::Disconnected,
                SessionState::Disconnected.status(),
                events,
            );
            inner.log("Disconnected.", events);
            session
        });

        let Some(session) = session else {
            return;
        };
        match session.engine.try_lock() {
            Ok(mut engine) => DeviceGate::release(engine.0.as_mut()),
            Err(TryLockError::Poisoned(poisoned)) => {
                DeviceGate::release(poisoned.into_inner().0.as_mut());
            },
            Err(TryLockError::WouldBlock) => {
                debug!("Operation in flight, port closes when it returns");
            },
        }
    }

    fn identify(engine: &mut dyn FlasherEngine) -> Result<ChipInfo> {
        match engine.connect_and_handshake() {
            Ok(Some(chip)) => Ok(chip),
            Ok(None) => engine
                .detect_chip()
                .map_err(|e| reclassify(e, Error::Detection)),
            Err(e) => Err(reclassify(e, Error::Handshake)),
        }
    }

    fn run_job(
        &self,
        id: u64,
        engine: &mut dyn FlasherEngine,
        job: &FlashJob,
    ) -> Result<FlashReport> {
        let digest = job.digest_hex();
        if let Some(digest) = &digest {
            self.log_if_current(id, format!("Image SHA-256: {digest}"));
        }

        if job.erase_requested() {
            self.log_if_current(id, "Erasing flash...");
            engine
                .erase_flash()
                .map_err(|e| reclassify(e, Error::Erase))?;
            self.log_if_current(id, "Erase complete.");
        }

        self.log_if_current(
            id,
            format!("Writing firmware (offset {:#x})...", job.address()),
        );

        let engine_verifies = engine.capabilities().contains(Capabilities::VERIFY);
        if job.verify() && !engine_verifies {
            self.log_if_current(id, "Engine cannot verify written data, verification skipped.");
        }
        let options = WriteOptions::default().with_verify(job.verify() && engine_verifies);
        let mut written = 0;
        let mut on_progress = |current: usize, total: usize| {
            written = written.max(current);
            self.update(|inner, events| {
                if self.is_current(id) {
                    inner.set_progress(written, total, events);
                }
            });
        };
        engine
            .write_flash(job.image(), job.address(), &options, &mut on_progress)
            .map_err(|e| reclassify(e, Error::Write))?;

        Ok(FlashReport {
            bytes_written: written,
            bytes_total: job.len(),
            digest,
        })
    }

    fn abort_connect(&self, id: u64, err: Error) -> Error {
        self.update(|inner, events| {
            if !self.is_current(id) {
                debug!("Discarding connect failure of a closed session: {err}");
                return Error::Cancelled(Action::Connect);
            }
            inner.session = None;
            inner.fail(&err, SessionState::Disconnected, events);
            err
        })
    }

    fn log_if_current(&self, id: u64, message: impl Into<String>) {
        self.update(|inner, events| {
            if self.is_current(id) {
                inner.log(message, events);
            }
        });
    }

    fn is_current(&self, id: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == id
    }

    /// Apply `f` under the bookkeeping lock, then deliver the events it queued.
    fn update<R>(&self, f: impl FnOnce(&mut Inner, &mut Vec<SessionEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut inner = lock(&self.shared.inner);
            f(&mut inner, &mut events)
        };
        for event in &events {
            self.shared.observer.on_event(event);
        }
        result
    }

    fn try_update<R>(
        &self,
        f: impl FnOnce(&mut Inner, &mut Vec<SessionEvent>) -> Result<R>,
    ) -> Result<R> {
        self.update(f)
    }
}
