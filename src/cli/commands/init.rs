//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::rules::RulesEngine;

/// Create the data home layout and materialize the default rule packs.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    RulesEngine::materialize_defaults(&settings.rules_dir())?;

    println!(
        "  {} rule packs: {}",
        style("✓").green(),
        settings.rules_dir().display()
    );
    println!(
        "{} Initialized RexLit in {}",
        style("✓").green(),
        settings.home.display()
    );
    Ok(())
}
