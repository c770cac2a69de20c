//! Ingest command.

use std::path::Path;

use console::style;

use crate::cli::helpers;
use crate::config::Settings;
use crate::ingest::{IngestEvent, IngestService};
use crate::utils::CancelFlag;

pub async fn cmd_ingest(settings: &Settings, root: &Path) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let ledger = helpers::open_ledger(settings)?;
    let service = IngestService::new(settings, &ledger);

    let bar = helpers::spinner("ingesting");
    let outcome = service.run(root, &CancelFlag::new(), |event| match event {
        IngestEvent::FileIngested { .. } => bar.inc(1),
        IngestEvent::FileFailed { path, reason } => {
            bar.println(format!(
                "  {} {}: {}",
                style("!").yellow(),
                path.display(),
                reason
            ));
            bar.inc(1);
        }
        IngestEvent::BoundaryViolation { path } => {
            bar.println(format!(
                "  {} boundary violation: {}",
                style("✗").red(),
                path.display()
            ));
        }
        IngestEvent::Started { .. } => {}
    })?;
    bar.finish_and_clear();

    println!(
        "{} Ingested {} documents into {}",
        style("✓").green(),
        outcome.documents,
        outcome.manifest_path.display()
    );
    if !outcome.failures.is_empty() {
        println!(
            "  {} {} extraction failure(s) recorded as placeholders",
            style("!").yellow(),
            outcome.failures.len()
        );
    }
    if !outcome.boundary_violations.is_empty() {
        println!(
            "  {} {} boundary violation(s) skipped",
            style("✗").red(),
            outcome.boundary_violations.len()
        );
    }
    Ok(())
}
