//! Connect, flash, reset and disconnect against a scripted engine.

mod common;

use std::sync::{Arc, atomic::AtomicUsize};

use common::{Harness, Script};
use s3flash::{
    Action, Capabilities, ChipInfo, Error, FlashJob, Indicator, ResetMechanism, ResetOutcome,
    SessionEvent, SessionState, Signals,
};

fn image() -> Vec<u8> {
    vec![0xE9; 4096]
}

fn connected(script: &Script) -> Harness {
    let harness = Harness::new(script);
    harness.controller.connect().unwrap();
    harness
}

#[test]
fn test_connect_accepts_s3_variant() {
    let harness = Harness::new(&Script::with_chip("ESP32-S3-FH4R2"));

    let chip = harness.controller.connect().unwrap();

    assert_eq!(chip.name, "ESP32-S3-FH4R2");
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.controller.indicator(), Indicator::Ok);
    assert_eq!(harness.controller.chip(), Some(chip));
    assert!(
        harness
            .log_messages()
            .contains(&"Detected chip: ESP32-S3-FH4R2".to_string())
    );
    assert_eq!(harness.counters.opens(), 1);
    assert_eq!(harness.counters.closes(), 0);
}

#[test]
fn test_rejected_chip_closes_transport() {
    let harness = Harness::new(&Script::with_chip("ESP32-C3"));

    let err = harness.controller.connect().unwrap_err();

    assert!(matches!(err, Error::UnsupportedChip { ref detected, .. } if detected == "ESP32-C3"));
    assert_eq!(harness.controller.state(), SessionState::Disconnected);
    assert_eq!(harness.controller.chip(), None);
    assert_eq!(harness.counters.opens(), harness.counters.closes());
    assert!(
        harness
            .log_messages()
            .iter()
            .any(|m| m.starts_with("ERROR:") && m.contains("ESP32-C3"))
    );
    assert!(harness.controller.last_error().unwrap().contains("ESP32-C3"));
}

#[test]
fn test_rejected_chip_description_is_logged() {
    let script = Script {
        handshake_chip: Some(
            ChipInfo::new("ESP32-C3").with_description("revision v0.4, 4MB flash, WiFi, BLE"),
        ),
        ..Script::default()
    };
    let harness = Harness::new(&script);

    assert!(harness.controller.connect().is_err());

    let messages = harness.log_messages();
    let detected = messages
        .iter()
        .position(|m| m == "Detected chip: ESP32-C3")
        .unwrap();
    let described = messages
        .iter()
        .position(|m| m == "Chip description: revision v0.4, 4MB flash, WiFi, BLE")
        .unwrap();
    let rejected = messages.iter().position(|m| m.starts_with("ERROR:")).unwrap();
    assert!(detected < described && described < rejected);
}

#[test]
fn test_connect_failure_passes_through_error_state() {
    let harness = Harness::new(&Script::with_chip("ESP32-C3"));
    let _ = harness.controller.connect();

    let states: Vec<SessionState> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Error,
            SessionState::Disconnected
        ]
    );
}

#[test]
fn test_handshake_failure_tears_down() {
    let script = Script {
        handshake_fails: true,
        ..Script::with_chip("ESP32-S3")
    };
    let harness = Harness::new(&script);

    let err = harness.controller.connect().unwrap_err();

    assert!(matches!(err, Error::Handshake(ref m) if m.contains("no sync reply")));
    assert_eq!(harness.controller.state(), SessionState::Disconnected);
    assert_eq!(harness.counters.opens(), 1);
    assert_eq!(harness.counters.closes(), 1);
}

#[test]
fn test_detect_chip_fallback() {
    let script = Script {
        handshake_chip: None,
        detected_chip: Some(ChipInfo::new("ESP32-S3").with_description("QFN56, revision v0.2")),
        ..Script::default()
    };
    let harness = Harness::new(&script);

    harness.controller.connect().unwrap();

    assert_eq!(script.calls(), vec!["handshake", "detect"]);
    assert!(
        harness
            .log_messages()
            .contains(&"Chip description: QFN56, revision v0.2".to_string())
    );
}

#[test]
fn test_detection_failure_tears_down() {
    let harness = Harness::new(&Script::default());

    let err = harness.controller.connect().unwrap_err();

    assert!(matches!(err, Error::Detection(_)));
    assert_eq!(harness.controller.state(), SessionState::Disconnected);
    assert_eq!(harness.counters.opens(), harness.counters.closes());
}

#[test]
fn test_unavailable_port() {
    let harness = Harness::with_unavailable_port(&Script::with_chip("ESP32-S3"));

    let err = harness.controller.connect().unwrap_err();

    assert!(matches!(err, Error::DeviceUnavailable(_)));
    assert_eq!(harness.controller.state(), SessionState::Disconnected);
    assert_eq!(harness.counters.opens(), 0);
    // A new attempt is accepted afterwards
    assert!(matches!(
        harness.controller.connect(),
        Err(Error::DeviceUnavailable(_))
    ));
}

#[test]
fn test_connect_while_connected_is_rejected() {
    let harness = connected(&Script::with_chip("ESP32-S3"));

    let err = harness.controller.connect().unwrap_err();

    assert!(matches!(
        err,
        Error::InvalidState {
            action: Action::Connect,
            state: SessionState::Connected
        }
    ));
    assert_eq!(harness.counters.opens(), 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let harness = Harness::new(&Script::with_chip("ESP32-S3"));
    harness.controller.disconnect();
    assert_eq!(harness.controller.state(), SessionState::Disconnected);

    harness.controller.connect().unwrap();
    harness.controller.disconnect();
    harness.controller.disconnect();

    assert_eq!(harness.controller.state(), SessionState::Disconnected);
    assert_eq!(harness.controller.chip(), None);
    assert_eq!(harness.counters.opens(), 1);
    assert_eq!(harness.counters.closes(), 1);
}

#[test]
fn test_reconnect_builds_fresh_session() {
    let harness = connected(&Script::with_chip("ESP32-S3"));
    harness.controller.disconnect();

    harness.controller.connect().unwrap();

    assert_eq!(harness.counters.opens(), 2);
    assert_eq!(harness.counters.closes(), 1);
    assert_eq!(harness.controller.state(), SessionState::Connected);
}

#[test]
fn test_flash_reports_progress_sequence() {
    let script = Script {
        write_steps: vec![0, 1024, 4096, 4096],
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    let report = harness.controller.flash(FlashJob::new(image())).unwrap();

    assert_eq!(harness.progress_percents(), vec![0.0, 25.0, 100.0, 100.0]);
    assert_eq!(report.bytes_written, 4096);
    assert_eq!(report.bytes_total, 4096);
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.controller.status(), "Done");
    assert!(harness.log_messages().contains(&"Flash complete.".to_string()));
}

#[test]
fn test_flash_forces_full_progress_on_success() {
    let script = Script {
        write_steps: vec![0, 2048],
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    harness.controller.flash(FlashJob::new(image())).unwrap();

    assert_eq!(harness.progress_percents(), vec![0.0, 50.0, 100.0]);
    assert!((harness.controller.progress() - 100.0).abs() < f64::EPSILON);
}

#[test]
fn test_write_error_keeps_session_and_allows_retry() {
    let script = Script {
        write_failures: Arc::new(AtomicUsize::new(1)),
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    let err = harness.controller.flash(FlashJob::new(image())).unwrap_err();
    assert!(matches!(err, Error::Write(ref m) if m.contains("device stopped answering")));
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.controller.status(), "Failed");
    assert!(harness.controller.progress().abs() < f64::EPSILON);
    assert_eq!(harness.counters.closes(), 0);

    harness.controller.flash(FlashJob::new(image())).unwrap();
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.controller.last_error(), None);
}

#[test]
fn test_erase_runs_before_write() {
    let script = Script::with_chip("ESP32-S3");
    let harness = connected(&script);

    harness
        .controller
        .flash(FlashJob::new(image()).with_erase(true))
        .unwrap();

    assert_eq!(script.calls(), vec!["handshake", "erase", "write"]);
    let log = harness.log_messages();
    let erase = log.iter().position(|m| m == "Erasing flash...").unwrap();
    let done = log.iter().position(|m| m == "Erase complete.").unwrap();
    let write = log
        .iter()
        .position(|m| m == "Writing firmware (offset 0x0)...")
        .unwrap();
    assert!(erase < done && done < write);
}

#[test]
fn test_erase_failure_skips_write() {
    let script = Script {
        erase_fails: true,
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    let err = harness
        .controller
        .flash(FlashJob::new(image()).with_erase(true))
        .unwrap_err();

    assert!(matches!(err, Error::Erase(_)));
    assert!(!script.calls().contains(&"write".to_string()));
    assert_eq!(harness.controller.state(), SessionState::Connected);
}

#[test]
fn test_verify_flag_reaches_engine() {
    let script = Script {
        capabilities: Capabilities::VERIFY,
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    let report = harness
        .controller
        .flash(FlashJob::new(image()).with_verify(true))
        .unwrap();

    assert!(script.last_verify.load(std::sync::atomic::Ordering::SeqCst));
    let digest = report.digest.unwrap();
    assert_eq!(digest.len(), 64);
    assert!(
        harness
            .log_messages()
            .contains(&format!("Image SHA-256: {digest}"))
    );
}

#[test]
fn test_verify_skipped_when_engine_cannot_verify() {
    let script = Script::with_chip("ESP32-S3");
    let harness = connected(&script);

    let report = harness
        .controller
        .flash(FlashJob::new(image()).with_verify(true))
        .unwrap();

    assert!(!script.last_verify.load(std::sync::atomic::Ordering::SeqCst));
    assert!(report.digest.is_some());
    assert!(
        harness
            .log_messages()
            .contains(&"Engine cannot verify written data, verification skipped.".to_string())
    );
}

#[test]
fn test_flash_requires_connection() {
    let harness = Harness::new(&Script::with_chip("ESP32-S3"));

    let err = harness.controller.flash(FlashJob::new(image())).unwrap_err();

    assert!(matches!(err, Error::InvalidState { action: Action::Flash, .. }));
    assert_eq!(harness.log_messages(), vec!["Not connected.".to_string()]);
}

#[test]
fn test_empty_image_is_rejected() {
    let script = Script::with_chip("ESP32-S3");
    let harness = connected(&script);

    let err = harness.controller.flash(FlashJob::new(Vec::new())).unwrap_err();

    assert!(matches!(err, Error::EmptyImage));
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert!(!script.calls().contains(&"write".to_string()));
    assert!(
        harness
            .log_messages()
            .contains(&"Please choose a .bin file first.".to_string())
    );
}

#[test]
fn test_reset_prefers_engine_reset() {
    let script = Script {
        capabilities: Capabilities::HARD_RESET,
        ..Script::with_chip("ESP32-S3")
    };
    let harness = connected(&script);

    let outcome = harness.controller.reset().unwrap();

    assert_eq!(outcome, ResetOutcome::Reset(ResetMechanism::EngineHardReset));
    assert!(harness.counters.signals().is_empty());
    assert_eq!(harness.controller.state(), SessionState::Connected);
}

#[test]
fn test_reset_tries_signal_line_before_manual() {
    let harness = connected(&Script::with_chip("ESP32-S3"));

    let outcome = harness.controller.reset().unwrap();

    assert_eq!(outcome, ResetOutcome::Reset(ResetMechanism::SignalPulse));
    assert_eq!(
        harness.counters.signals(),
        vec![Signals::RTS_ASSERTED, Signals::RELEASED]
    );
}

#[test]
fn test_reset_without_mechanisms_needs_manual_action() {
    let harness = Harness::without_control_lines(&Script::with_chip("ESP32-S3"));
    harness.controller.connect().unwrap();

    let outcome = harness.controller.reset().unwrap();

    assert_eq!(outcome, ResetOutcome::ManualActionRequired);
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.controller.last_error(), None);
}

#[test]
fn test_failed_reset_keeps_session() {
    let script = Script {
        capabilities: Capabilities::HARD_RESET,
        hard_reset_fails: true,
        ..Script::with_chip("ESP32-S3")
    };
    let harness = Harness::without_control_lines(&script);
    harness.controller.connect().unwrap();

    let outcome = harness.controller.reset().unwrap();

    assert!(matches!(outcome, ResetOutcome::Failed(ref m) if m.contains("no response")));
    assert_eq!(harness.controller.state(), SessionState::Connected);
    assert_eq!(harness.counters.closes(), 0);
    assert!(
        harness
            .log_messages()
            .iter()
            .any(|m| m.starts_with("ERROR: Reset failed"))
    );
}
