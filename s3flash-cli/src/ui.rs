//! Terminal rendering of session events.

use {
    console::{Style, style},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    s3flash::{Indicator, LogEntry, SessionEvent, SessionObserver, SessionState},
    std::sync::atomic::{AtomicBool, Ordering},
};

/// Color for the connectivity indicator.
pub(crate) fn indicator_style(indicator: Indicator) -> Style {
    match indicator {
        Indicator::Bad => Style::new().red(),
        Indicator::Warn => Style::new().yellow(),
        Indicator::Ok => Style::new().green(),
    }
}

/// `● Connected` in the indicator's color.
pub(crate) fn status_line(indicator: Indicator, status: &str) -> String {
    format!("{} {status}", indicator_style(indicator).apply_to("●"))
}

fn styled_entry(entry: &LogEntry) -> String {
    let time = style(format!("[{}]", entry.timestamp.format("%H:%M:%S"))).dim();
    let message = if entry.message.starts_with("ERROR:") {
        style(&entry.message).red().bold()
    } else if entry.message.starts_with("Reset not supported") {
        style(&entry.message).yellow()
    } else {
        style(&entry.message)
    };
    format!("{time} {message}")
}

/// Prints the session log to stderr and drives a progress bar while flashing.
pub(crate) struct ConsoleObserver {
    bar: ProgressBar,
    fancy: bool,
    quiet: bool,
    flashing: AtomicBool,
}

impl ConsoleObserver {
    pub(crate) fn new(fancy: bool, quiet: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden());
        #[allow(clippy::unwrap_used)] // Static template string
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Self {
            bar,
            fancy: fancy && !quiet,
            quiet,
            flashing: AtomicBool::new(false),
        }
    }

    fn print(&self, entry: &LogEntry) {
        let is_error = entry.message.starts_with("ERROR:");
        if self.quiet && !is_error {
            return;
        }
        let line = if self.fancy {
            styled_entry(entry)
        } else {
            entry.to_string()
        };
        self.bar.suspend(|| eprintln!("{line}"));
    }

    fn start_bar(&self) {
        self.flashing.store(true, Ordering::SeqCst);
        self.bar.reset();
        self.bar.set_position(0);
        self.bar.set_message("Flashing");
        if self.fancy {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
    }

    fn stop_bar(&self, status: &str) {
        if !self.flashing.swap(false, Ordering::SeqCst) {
            return;
        }
        if status == "Done" {
            self.bar.finish_with_message("Done");
        } else {
            self.bar.abandon_with_message(status.to_string());
        }
        self.bar.set_draw_target(ProgressDrawTarget::hidden());
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { state, status, .. } => {
                log::debug!("Session {state}: {status}");
                match state {
                    SessionState::Flashing => self.start_bar(),
                    // Error is transient, wait for where the session settles
                    SessionState::Error => {},
                    _ => self.stop_bar(status),
                }
            },
            SessionEvent::Progress(progress) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                self.bar.set_position(progress.percent.round() as u64);
            },
            SessionEvent::Log(entry) => self.print(entry),
        }
    }
}
