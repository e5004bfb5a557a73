//! Command implementations.
//!
//! Each subcommand is implemented in its own module. The device commands
//! share [`open_session`], which picks the port up front so selection errors
//! keep their own exit codes.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod info;
pub(crate) mod ports;
pub(crate) mod reset;
pub(crate) mod session;

use {
    crate::{Cli, config::Config, engine::engine_factory, get_port, register_session, ui::ConsoleObserver, use_fancy_output},
    anyhow::Result,
    console::style,
    s3flash::{ControllerConfig, DeviceGate, NativePortSelector, SerialConfig, SessionController},
};

/// Build a controller around `gate` with the CLI's engine and console output.
///
/// `verify` turns on engine-side verification for the whole session.
pub(crate) fn build_controller(
    cli: &Cli,
    config: &Config,
    gate: DeviceGate,
    verify: bool,
) -> SessionController {
    let controller = SessionController::builder(gate, engine_factory(verify))
        .config(ControllerConfig {
            baud_rate: cli.effective_baud(config),
            family: Cli::family(config),
            ..ControllerConfig::default()
        })
        .observer(ConsoleObserver::new(use_fancy_output(), cli.quiet))
        .build();
    register_session(&controller);
    controller
}

/// Select a port now and build a controller bound to it.
pub(crate) fn open_session(cli: &Cli, config: &mut Config, verify: bool) -> Result<SessionController> {
    let port = get_port(cli, config)?;
    let baud = cli.effective_baud(config);
    if !cli.quiet {
        eprintln!(
            "{} Using {} at {baud} baud",
            style("🔌").cyan(),
            style(&port).bold()
        );
    }

    let gate = DeviceGate::new(NativePortSelector::new(SerialConfig::new(port, baud)));
    Ok(build_controller(cli, config, gate, verify))
}
