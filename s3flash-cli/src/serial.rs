//! Interactive serial port selection.
//!
//! Supports:
//! - Auto-detection of known USB bridges
//! - Interactive selection via dialoguer
//! - Remembering selected bridges in configuration
//! - Non-interactive mode for CI/CD
//!
//! [`InteractivePortSelector`] plugs the same logic into a session's
//! [`s3flash::DeviceGate`] so every connect asks again.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    s3flash::{DetectedPort, NativeTransport, PortSelector, SerialConfig, Transport, detect_ports},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known/configured device.
    pub is_known: bool,
}

// Selection failures are setup problems, exit code 2
fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn select_non_interactive_port(
    selection_ports: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    let mut ports = selection_ports.into_iter();
    match (ports.next(), ports.next()) {
        (Some(port), None) => Ok(SelectedPort {
            is_known: is_known_device(&port, config),
            port,
        }),
        (Some(_), Some(_)) => Err(usage_err(
            "Multiple serial ports found. Use --port to choose one in non-interactive mode.",
        )),
        (None, _) => Err(usage_err("No serial port available.")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = detect_ports();
    if ports.is_empty() {
        return Err(usage_err(
            "No serial ports found. Is the board plugged in?",
        ));
    }

    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();

    // Known bridges first unless the user asks for everything
    let selection_ports = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(selection_ports, config);
    }

    if selection_ports.len() > 1 {
        ensure_interactive_terminal()?;
        return select_port_interactive(selection_ports, config);
    }

    let Some(port) = selection_ports.into_iter().next() else {
        return Err(usage_err("No serial port available."));
    };
    let is_known = is_known_device(&port, config);

    if is_known && !options.confirm_port {
        info!("Auto-selected port: {}", port.label());
        Ok(SelectedPort { port, is_known })
    } else {
        ensure_interactive_terminal()?;
        confirm_single_port(port)
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal. Use --port instead.",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            CliError::Cancelled("Prompt cancelled.".to_string()).into()
        },
        DialoguerError::IO(io_err) => usage_err(&format!("Prompt failed: {io_err}")),
    }
}

/// Find a port by name, falling back to a bare entry for unlisted paths.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();

    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

    match found {
        Some(port) => SelectedPort {
            port: port.clone(),
            is_known: port.device.is_known(),
        },
        // The user named it explicitly, so don't ask about it
        None => SelectedPort {
            port: DetectedPort::unknown(name),
            is_known: true,
        },
    }
}

/// Check if a port matches a known device (from config or built-in list).
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port.device.is_known() {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.knows_usb_device(vid, pid),
        _ => false,
    }
}

fn menu_label(port: &DetectedPort, config: &Config, max_width: usize) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name).bold().to_string()
    } else {
        port.name.clone()
    };

    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    // Keep each item on one line in narrow terminals
    console::truncate_str(&format!("{name}{device_info}{product}"), max_width, "\u{2026}")
        .into_owned()
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );
    eprintln!("{}", style("Recognised USB bridges are shown in bold.").dim());

    ports.sort_by_key(|p| !is_known_device(p, config));

    let term_width = usize::from(console::Term::stderr().size().1);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| menu_label(port, config, term_width.saturating_sub(4)))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    let Some(index) = selection else {
        return Err(CliError::Cancelled("Port selection cancelled.".to_string()).into());
    };
    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
    let is_known = is_known_device(&port, config);
    Ok(SelectedPort { port, is_known })
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: DetectedPort) -> Result<SelectedPort> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}?", port.label()))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(CliError::Cancelled("Port selection cancelled.".to_string()).into())
    }
}

/// Ask user if they want to remember this port.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.knows_usb_device(vid, pid) {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this USB device for next time?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}

/// Runs port selection each time a session connects.
pub struct InteractivePortSelector {
    options: SerialOptions,
    config: Config,
    baud_rate: u32,
}

impl InteractivePortSelector {
    pub fn new(options: SerialOptions, config: Config, baud_rate: u32) -> Self {
        Self {
            options,
            config,
            baud_rate,
        }
    }
}

impl PortSelector for InteractivePortSelector {
    fn request_port(&mut self) -> s3flash::Result<Box<dyn Transport>> {
        let selected = select_serial_port(&self.options, &self.config)
            .map_err(|e| s3flash::Error::DeviceUnavailable(e.to_string()))?;

        if !selected.is_known && !self.options.non_interactive {
            if let Err(e) = ask_remember_port(&selected.port, &mut self.config) {
                debug!("Not remembering port: {e}");
            }
        }

        let transport = NativeTransport::open(&SerialConfig::new(
            selected.port.name,
            self.baud_rate,
        ))?;
        Ok(Box::new(transport))
    }
}
