//! Scripted fakes for driving `SessionController` without hardware.

#![allow(dead_code)]

use std::{
    io::{Read, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{Receiver, Sender},
    },
    time::Duration,
};

use s3flash::{
    Capabilities, ChipInfo, ControllerConfig, DeviceGate, Error, FlasherEngine, Result,
    SessionController, SessionEvent, Signals, Transport, WriteOptions,
};

/// Open/close bookkeeping shared by every transport a selector hands out.
#[derive(Debug, Default)]
pub struct PortCounters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub signals: Mutex<Vec<Signals>>,
}

impl PortCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn signals(&self) -> Vec<Signals> {
        self.signals.lock().unwrap().clone()
    }
}

pub struct FakeTransport {
    open: bool,
    control_lines: bool,
    counters: Arc<PortCounters>,
}

impl Read for FakeTransport {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }
}

impl Write for FakeTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "/dev/fake0"
    }

    fn baud_rate(&self) -> u32 {
        115_200
    }

    fn supports_signals(&self) -> bool {
        self.control_lines
    }

    fn set_signals(&mut self, signals: Signals) -> Result<()> {
        self.counters.signals.lock().unwrap().push(signals);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A write that blocks until the test lets it go.
#[derive(Clone)]
pub struct WriteGate {
    pub started: Sender<()>,
    pub release: Arc<Mutex<Receiver<()>>>,
}

/// What the fake engine does on each call.
#[derive(Clone, Default)]
pub struct Script {
    /// Chip reported by the handshake, or `None` to force `detect_chip`.
    pub handshake_chip: Option<ChipInfo>,
    /// Chip reported by `detect_chip`.
    pub detected_chip: Option<ChipInfo>,
    pub handshake_fails: bool,
    pub erase_fails: bool,
    /// Fail this many writes before succeeding.
    pub write_failures: Arc<AtomicUsize>,
    /// `written` values reported during a write.
    pub write_steps: Vec<usize>,
    pub capabilities: Capabilities,
    pub hard_reset_fails: bool,
    pub pending_write: Option<WriteGate>,
    /// Calls made, in order.
    pub calls: Arc<Mutex<Vec<String>>>,
    pub last_verify: Arc<AtomicBool>,
}

impl Script {
    pub fn with_chip(name: &str) -> Self {
        Self {
            handshake_chip: Some(ChipInfo::new(name)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub struct FakeEngine {
    script: Script,
    transport: Box<dyn Transport>,
}

impl FakeEngine {
    fn record(&self, call: &str) {
        self.script.calls.lock().unwrap().push(call.to_string());
    }
}

impl FlasherEngine for FakeEngine {
    fn capabilities(&self) -> Capabilities {
        self.script.capabilities
    }

    fn connect_and_handshake(&mut self) -> Result<Option<ChipInfo>> {
        self.record("handshake");
        if self.script.handshake_fails {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no sync reply",
            )));
        }
        Ok(self.script.handshake_chip.clone())
    }

    fn detect_chip(&mut self) -> Result<ChipInfo> {
        self.record("detect");
        self.script
            .detected_chip
            .clone()
            .ok_or_else(|| Error::Detection("unknown magic value".into()))
    }

    fn erase_flash(&mut self) -> Result<()> {
        self.record("erase");
        if self.script.erase_fails {
            return Err(Error::Erase("flash busy".into()));
        }
        Ok(())
    }

    fn write_flash(
        &mut self,
        image: &[u8],
        _address: u32,
        options: &WriteOptions,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        self.record("write");
        self.script.last_verify.store(options.verify, Ordering::SeqCst);

        if let Some(gate) = &self.script.pending_write {
            gate.started.send(()).unwrap();
            gate.release.lock().unwrap().recv().unwrap();
        }

        let failures = &self.script.write_failures;
        if failures.load(Ordering::SeqCst) > 0 {
            failures.fetch_sub(1, Ordering::SeqCst);
            progress(0, image.len());
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device stopped answering",
            )));
        }

        if self.script.write_steps.is_empty() {
            progress(image.len(), image.len());
        }
        for &written in &self.script.write_steps {
            progress(written, image.len());
        }
        Ok(())
    }

    fn hard_reset(&mut self) -> Result<()> {
        self.record("hard_reset");
        if self.script.hard_reset_fails {
            return Err(Error::Reset("no response".into()));
        }
        Ok(())
    }

    fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

/// Everything a test needs to inspect after driving a controller.
pub struct Harness {
    pub controller: SessionController,
    pub counters: Arc<PortCounters>,
    pub events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Harness {
    pub fn new(script: &Script) -> Self {
        Self::build(script, true, false)
    }

    pub fn without_control_lines(script: &Script) -> Self {
        Self::build(script, false, false)
    }

    pub fn with_unavailable_port(script: &Script) -> Self {
        Self::build(script, true, true)
    }

    fn build(script: &Script, control_lines: bool, port_denied: bool) -> Self {
        let counters = Arc::new(PortCounters::default());
        let events = Arc::new(Mutex::new(Vec::new()));

        let selector_counters = Arc::clone(&counters);
        let gate = DeviceGate::new(move || -> Result<Box<dyn Transport>> {
            if port_denied {
                return Err(Error::DeviceUnavailable("selection cancelled".into()));
            }
            selector_counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeTransport {
                open: true,
                control_lines,
                counters: Arc::clone(&selector_counters),
            }))
        });

        let engine_script = script.clone();
        let factory = move |transport: Box<dyn Transport>, _baud: u32| -> Box<dyn FlasherEngine> {
            Box::new(FakeEngine {
                script: engine_script.clone(),
                transport,
            })
        };

        let sink = Arc::clone(&events);
        let controller = SessionController::builder(gate, factory)
            .config(ControllerConfig {
                reset_pulse: Duration::from_millis(1),
                ..ControllerConfig::default()
            })
            .observer(move |event: &SessionEvent| sink.lock().unwrap().push(event.clone()))
            .build();

        Self {
            controller,
            counters,
            events,
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_percents(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.controller
            .log()
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }
}
