//! Redaction plan / apply commands.

use std::path::PathBuf;

use console::style;

use crate::cli::helpers;
use crate::config::Settings;
use crate::error::RexError;
use crate::redact::{RedactionService, RegexPiiDetector};

pub fn cmd_plan(settings: &Settings) -> anyhow::Result<()> {
    let records = helpers::load_manifest(settings)?;
    let ledger = helpers::open_ledger(settings)?;
    let service = RedactionService::new(settings, &ledger);

    let detector = RegexPiiDetector::default();
    let (plan, path) = service.plan(&records, &detector)?;
    println!(
        "{} Planned redactions for {} of {} documents (plan {})",
        style("✓").green(),
        plan.documents.len(),
        records.len(),
        &plan.header.plan_id[..16]
    );
    println!(
        "  types: {}",
        plan.header
            .pii_types
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  written to {}", path.display());
    Ok(())
}

pub fn cmd_apply(
    settings: &Settings,
    plan_path: Option<PathBuf>,
    force: bool,
    preview: bool,
) -> anyhow::Result<()> {
    let ledger = helpers::open_ledger(settings)?;
    let service = RedactionService::new(settings, &ledger);

    let path = match plan_path {
        Some(path) => path,
        None => latest_plan(settings)?,
    };
    let plan = service.load_plan(&path)?;
    let outcome = service.apply(&plan, force, preview)?;

    if preview {
        println!(
            "{} Rendered {} comparison artifact(s) covering {} region(s)",
            style("✓").green(),
            outcome.applied.len(),
            outcome.regions
        );
    } else {
        println!(
            "{} Applied {} region(s) across {} document(s)",
            style("✓").green(),
            outcome.regions,
            outcome.applied.len()
        );
    }
    if outcome.forced > 0 {
        println!(
            "  {} {} drifted input(s) overridden by --force",
            style("!").yellow(),
            outcome.forced
        );
    }
    Ok(())
}

/// Most recently modified plan in the plans directory.
fn latest_plan(settings: &Settings) -> Result<PathBuf, RexError> {
    let dir = settings.redaction_plans_dir();
    let mut plans: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "jsonl") == Some(true) {
                let modified = entry
                    .metadata()?
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                plans.push((modified, path));
            }
        }
    }
    plans.sort();
    plans
        .pop()
        .map(|(_, path)| path)
        .ok_or_else(|| {
            RexError::ConfigError(format!(
                "no redaction plans under {}; run `redact plan` first",
                dir.display()
            ))
        })
}
