//! Flash command implementation.

use {
    crate::{Cli, CliError, commands::open_session, config::Config},
    anyhow::{Context, Result},
    console::style,
    log::warn,
    s3flash::{FlashJob, ResetOutcome, SessionController},
    std::{fs, path::Path},
};

/// Switches for one flash run, already merged with the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlashArgs {
    pub(crate) erase: bool,
    pub(crate) verify: bool,
    pub(crate) reset: bool,
}

impl FlashArgs {
    /// Flags can switch config defaults on, and `--no-reset` can switch reset off.
    fn merged(self, config: &Config) -> Self {
        Self {
            erase: self.erase || config.flash.erase_before_write,
            verify: self.verify || config.flash.verify,
            reset: self.reset && config.flash.reset_after.unwrap_or(true),
        }
    }
}

fn load_image(image: &Path) -> Result<Vec<u8>> {
    if image.extension().and_then(|e| e.to_str()) != Some("bin") {
        warn!("{} does not look like a .bin image", image.display());
    }
    let data = fs::read(image)
        .with_context(|| format!("Failed to read firmware image {}", image.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("{} is empty", image.display())).into());
    }
    Ok(data)
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &mut Config, image: &Path, args: FlashArgs) -> Result<()> {
    let args = args.merged(config);
    let data = load_image(image)?;
    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes)",
            style("📦").cyan(),
            image.display(),
            data.len()
        );
    }

    let controller = open_session(cli, config, args.verify)?;
    let result = run(&controller, data, args);
    controller.disconnect();
    let outcome = result?;

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
        match outcome {
            Some(ResetOutcome::ManualActionRequired | ResetOutcome::Failed(_)) => eprintln!(
                "{} Press the RESET button to start the new firmware.",
                style("⚠").yellow()
            ),
            Some(ResetOutcome::Reset(_)) | None => {},
        }
    }
    Ok(())
}

fn run(controller: &SessionController, data: Vec<u8>, args: FlashArgs) -> Result<Option<ResetOutcome>> {
    controller.connect()?;

    let job = FlashJob::new(data)
        .with_erase(args.erase)
        .with_verify(args.verify);
    controller.flash(job)?;

    if args.reset {
        Ok(Some(controller.reset()?))
    } else {
        Ok(None)
    }
}
