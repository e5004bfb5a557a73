//! Reset command implementation.

use {
    crate::{Cli, commands::open_session, config::Config},
    anyhow::Result,
    console::style,
    s3flash::ResetOutcome,
};

/// Connect, run the reset chain, disconnect.
pub(crate) fn cmd_reset(cli: &Cli, config: &mut Config) -> Result<()> {
    let controller = open_session(cli, config, false)?;
    let result = controller.connect().and_then(|_| controller.reset());
    controller.disconnect();

    match result? {
        ResetOutcome::Reset(_) => {
            if !cli.quiet {
                eprintln!("{} Chip restarted", style("✓").green());
            }
        },
        ResetOutcome::ManualActionRequired => {
            eprintln!(
                "{} Press the RESET button on the board.",
                style("⚠").yellow()
            );
        },
        // Already logged by the session, but the exit code must say so
        ResetOutcome::Failed(reason) => anyhow::bail!("Reset failed: {reason}"),
    }
    Ok(())
}
