//! Interactive session command.
//!
//! A menu loop over one [`SessionController`]. Only the actions the current
//! state enables are offered, so the menu can never ask for something the
//! controller would reject.

use {
    crate::{
        Cli, CliError,
        commands::build_controller,
        config::Config,
        serial::{InteractivePortSelector, map_prompt_error},
        ui::status_line,
        was_interrupted,
    },
    anyhow::Result,
    console::style,
    dialoguer::{Input, Select, theme::ColorfulTheme},
    log::debug,
    s3flash::{Action, ActionSet, DeviceGate, FlashJob, SessionController},
    std::{fmt, fs, io::IsTerminal, path::PathBuf, sync::Arc},
};

/// One menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Run(Action),
    ChooseImage,
    ToggleErase,
    Quit,
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(Action::Connect) => f.write_str("Connect"),
            Self::Run(Action::Flash) => f.write_str("Flash"),
            Self::Run(Action::Reset) => f.write_str("Reset"),
            Self::Run(Action::Disconnect) => f.write_str("Disconnect"),
            Self::ChooseImage => f.write_str("Choose .bin image"),
            Self::ToggleErase => f.write_str("Toggle erase before write"),
            Self::Quit => f.write_str("Quit"),
        }
    }
}

fn menu_items(allowed: ActionSet) -> Vec<MenuItem> {
    let mut items: Vec<MenuItem> = allowed.actions().into_iter().map(MenuItem::Run).collect();
    items.extend([MenuItem::ChooseImage, MenuItem::ToggleErase, MenuItem::Quit]);
    items
}

/// Image and erase toggle picked in the menu.
#[derive(Default)]
struct Selection {
    path: Option<PathBuf>,
    image: Option<Arc<[u8]>>,
    erase: bool,
    verify: bool,
}

impl Selection {
    fn job(&self) -> FlashJob {
        // An empty job makes the controller ask for an image
        let image: Arc<[u8]> = self.image.clone().unwrap_or_else(|| Arc::from(Vec::new()));
        FlashJob::new(image)
            .with_erase(self.erase)
            .with_verify(self.verify)
    }

    fn summary(&self) -> String {
        let image = self
            .path
            .as_ref()
            .map_or_else(|| "no image".to_string(), |p| p.display().to_string());
        let erase = if self.erase { "erase on" } else { "erase off" };
        format!("{image}, {erase}")
    }
}

fn choose_image(selection: &mut Selection) -> Result<()> {
    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Path to .bin image")
        .interact_text()
        .map_err(map_prompt_error)?;
    let path = PathBuf::from(input.trim());

    match fs::read(&path) {
        Ok(data) => {
            eprintln!(
                "{} Selected {} ({} bytes)",
                style("📦").cyan(),
                path.display(),
                data.len()
            );
            selection.image = Some(Arc::from(data));
            selection.path = Some(path);
        },
        Err(e) => eprintln!("{} Cannot read {}: {e}", style("✗").red(), path.display()),
    }
    Ok(())
}

fn run_action(controller: &SessionController, action: Action, selection: &Selection) {
    // Failures are already in the session log
    let result = match action {
        Action::Connect => controller.connect().map(|_| ()),
        Action::Flash => controller.flash(selection.job()).map(|_| ()),
        Action::Reset => controller.reset().map(|_| ()),
        Action::Disconnect => {
            controller.disconnect();
            Ok(())
        },
    };
    if let Err(e) = result {
        debug!("{action} ended with: {e}");
    }
}

/// Interactive session command implementation.
pub(crate) fn cmd_session(cli: &Cli, config: &Config) -> Result<()> {
    if cli.non_interactive || !std::io::stdin().is_terminal() {
        return Err(CliError::Usage(
            "The session menu needs an interactive terminal. Use flash/info/reset instead."
                .to_string(),
        )
        .into());
    }

    let selector = InteractivePortSelector::new(
        cli.serial_options(),
        config.clone(),
        cli.effective_baud(config),
    );
    let controller = build_controller(
        cli,
        config,
        DeviceGate::new(selector),
        config.flash.verify,
    );
    let mut selection = Selection {
        erase: config.flash.erase_before_write,
        verify: config.flash.verify,
        ..Selection::default()
    };

    loop {
        if was_interrupted() {
            break;
        }

        let chip = controller
            .chip()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        eprintln!(
            "\n{}{chip}  {}",
            status_line(controller.indicator(), &controller.status()),
            style(selection.summary()).dim()
        );

        let items = menu_items(controller.allowed_actions());
        let labels: Vec<String> = items.iter().map(ToString::to_string).collect();
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Action")
            .items(&labels)
            .default(0)
            .interact_opt()
            .map_err(map_prompt_error)?;

        match choice.and_then(|i| items.get(i).copied()) {
            Some(MenuItem::Run(action)) => run_action(&controller, action, &selection),
            Some(MenuItem::ChooseImage) => choose_image(&mut selection)?,
            Some(MenuItem::ToggleErase) => selection.erase = !selection.erase,
            Some(MenuItem::Quit) | None => break,
        }
    }

    controller.disconnect();
    Ok(())
}
