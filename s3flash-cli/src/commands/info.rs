//! Info command implementation.

use {
    crate::{Cli, commands::open_session, config::Config},
    anyhow::Result,
    console::style,
    s3flash::ChipInfo,
};

fn chip_json(chip: &ChipInfo, family: &str, baud: u32) -> serde_json::Value {
    serde_json::json!({
        "chip": chip,
        "family": family,
        "baud": baud,
    })
}

/// Connect, report the detected chip, disconnect.
pub(crate) fn cmd_info(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let controller = open_session(cli, config, false)?;
    let result = controller.connect();
    controller.disconnect();
    let chip = result?;

    if json {
        let value = chip_json(&chip, controller.family(), cli.effective_baud(config));
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    eprintln!("{}", style("Chip Information").bold().underlined());
    eprintln!("  {:<12} {}", style("Chip:").dim(), style(&chip.name).cyan().bold());
    if let Some(description) = &chip.description {
        eprintln!("  {:<12} {description}", style("Details:").dim());
    }
    eprintln!("  {:<12} {}", style("Accepted:").dim(), controller.family());
    Ok(())
}
