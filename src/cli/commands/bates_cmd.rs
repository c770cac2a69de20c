//! Bates plan / apply commands.

use console::style;

use crate::bates::{Anchor, BatesService, LopdfStamper, PlanRequest};
use crate::cli::helpers;
use crate::config::Settings;

pub fn cmd_plan(
    settings: &Settings,
    prefix: String,
    start: u64,
    width: usize,
    dry_run: bool,
) -> anyhow::Result<()> {
    let records = helpers::load_manifest(settings)?;
    let request = PlanRequest {
        prefix,
        start,
        width,
    };

    if dry_run {
        // Dry run builds in memory and writes nothing.
        let plan = crate::bates::build_plan(&records, &request);
        let (labels, total) = plan.dry_run(10);
        for label in &labels {
            println!("  {}", label);
        }
        println!("{} pages total (plan {})", total, &plan.plan_id[..16]);
        return Ok(());
    }

    let ledger = helpers::open_ledger(settings)?;
    let service = BatesService::new(settings, &ledger);
    let (plan, path) = service.plan(&records, &request)?;
    println!(
        "{} Planned {} documents / {} pages (plan {})",
        style("✓").green(),
        plan.entries.len(),
        plan.total_pages(),
        &plan.plan_id[..16]
    );
    println!("  written to {}", path.display());
    Ok(())
}

pub fn cmd_apply(
    settings: &Settings,
    prefix: String,
    anchor: Anchor,
    backing: bool,
    force: bool,
) -> anyhow::Result<()> {
    let records = helpers::load_manifest(settings)?;
    let ledger = helpers::open_ledger(settings)?;
    let service = BatesService::new(settings, &ledger);
    let plan = service.load_plan(&prefix)?;

    let outcome = service.apply(&plan, &records, &LopdfStamper, anchor, backing, force)?;
    println!(
        "{} Stamped {} documents ({} pages)",
        style("✓").green(),
        outcome.stamped.len(),
        outcome.page_stamps.len()
    );
    if outcome.forced_conflicts > 0 {
        println!(
            "  {} {} collision(s) overridden by --force",
            style("!").yellow(),
            outcome.forced_conflicts
        );
    }
    Ok(())
}
