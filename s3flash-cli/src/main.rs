//! s3flash CLI - Command-line tool for flashing ESP32-S3 boards.
//!
//! ## Features
//!
//! - Flash a raw `.bin` image at offset 0x0, optionally erasing first
//! - Identify the attached chip
//! - Reset the chip with fallbacks
//! - Interactive session menu
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    s3flash::{DEFAULT_FAMILY, SUPPORTED_BAUDS, SessionController},
    std::{
        env,
        path::PathBuf,
        process,
        sync::{
            OnceLock,
            atomic::{AtomicBool, Ordering},
        },
    },
};

mod commands;
mod config;
mod engine;
mod serial;
mod ui;

use {
    config::Config,
    serial::{SerialOptions, ask_remember_port, select_serial_port},
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The controller Ctrl-C should disconnect, once a command has built one.
static ACTIVE_SESSION: OnceLock<SessionController> = OnceLock::new();

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Errors that map to a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or environment (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user backed out (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// s3flash - Flash firmware onto ESP32-S3 boards over a serial port.
///
/// Environment variables:
///   S3FLASH_PORT              - Default serial port
///   S3FLASH_BAUD              - Default baud rate (default: 115200)
///   S3FLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "s3flash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "S3FLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate for data transfer (115200, 230400, 460800 or 921600).
    #[arg(short, long, global = true, env = "S3FLASH_BAUD", value_parser = parse_baud)]
    pub(crate) baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "S3FLASH_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    pub(crate) confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    pub(crate) list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Flash a raw binary image at offset 0x0.
    Flash {
        /// Path to the .bin image.
        image: PathBuf,

        /// Erase the whole flash before writing.
        #[arg(long)]
        erase: bool,

        /// Ask the engine to verify, and log the image SHA-256.
        #[arg(long)]
        verify: bool,

        /// Leave the chip in the bootloader after writing.
        #[arg(long)]
        no_reset: bool,
    },

    /// Connect and show the detected chip.
    Info {
        /// Output chip information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Reset the chip.
    Reset,

    /// Interactive session: connect, flash, reset and disconnect from a menu.
    Session,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Only the baud rates the transfer phase supports.
fn parse_baud(s: &str) -> Result<u32, String> {
    let baud: u32 = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid baud rate '{s}': {e}"))?;
    if SUPPORTED_BAUDS.contains(&baud) {
        Ok(baud)
    } else {
        Err(format!(
            "Unsupported baud rate {baud}. Choose one of: {}",
            SUPPORTED_BAUDS
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

impl Cli {
    /// Baud rate from flags/env, then config, then the default.
    pub(crate) fn effective_baud(&self, config: &Config) -> u32 {
        if let Some(baud) = self.baud {
            return baud;
        }
        match config.connection.baud {
            Some(baud) if SUPPORTED_BAUDS.contains(&baud) => baud,
            Some(baud) => {
                log::warn!("Ignoring unsupported baud rate {baud} from config");
                SUPPORTED_BAUDS[0]
            },
            None => SUPPORTED_BAUDS[0],
        }
    }

    /// Chip family the session accepts.
    pub(crate) fn family(config: &Config) -> String {
        config
            .flash
            .chip_family
            .clone()
            .unwrap_or_else(|| DEFAULT_FAMILY.to_string())
    }

    pub(crate) fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            port: self.port.clone(),
            list_all_ports: self.list_all_ports,
            non_interactive: self.non_interactive,
            confirm_port: self.confirm_port,
        }
    }
}

/// Get serial port from CLI args, config or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let selected = select_serial_port(&cli.serial_options(), config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

/// Let Ctrl-C tear down `controller` instead of killing the process.
pub(crate) fn register_session(controller: &SessionController) {
    if ACTIVE_SESSION.set(controller.clone()).is_err() {
        debug!("Interrupt handler already bound to a session");
    }
}

fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: give up waiting
            process::exit(130);
        }
        match ACTIVE_SESSION.get() {
            Some(controller) => controller.disconnect(),
            None => process::exit(130),
        }
    });
    if let Err(e) = result {
        debug!("Could not install Ctrl-C handler: {e}");
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<s3flash::Error>() {
        Some(s3flash::Error::Cancelled(_)) => 130,
        _ => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            image,
            erase,
            verify,
            no_reset,
        } => commands::flash::cmd_flash(
            cli,
            &mut config,
            image,
            commands::flash::FlashArgs {
                erase: *erase,
                verify: *verify,
                reset: !*no_reset,
            },
        ),
        Commands::Info { json } => commands::info::cmd_info(cli, &mut config, *json),
        Commands::Reset => commands::reset::cmd_reset(cli, &mut config),
        Commands::Session => commands::session::cmd_session(cli, &config),
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json, &config);
            Ok(())
        },
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                commands::completions::cmd_completions(*shell)
            }
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "s3flash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        let code = exit_code(&err);
        if code == 130 {
            eprintln!("{} {err}", style("Cancelled:").yellow().bold());
        } else {
            eprintln!("{} {err:#}", style("Error:").red().bold());
        }
        process::exit(code);
    }
}
