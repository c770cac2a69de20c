//! Rules calc / list commands.

use std::path::PathBuf;

use chrono::NaiveDate;
use console::style;

use crate::config::Settings;
use crate::rules::{to_ics, RulesEngine, ServiceMethod};

#[allow(clippy::too_many_arguments)]
pub fn cmd_calc(
    settings: &Settings,
    jurisdiction: &str,
    event: &str,
    date: NaiveDate,
    service: ServiceMethod,
    explain: bool,
    ics: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = RulesEngine::load(&settings.rules_dir())?;
    let results = engine.calculate(jurisdiction, event, date, service, explain)?;

    for result in &results {
        println!(
            "{}  {}  {}",
            style(&result.name).bold(),
            result.due.format("%Y-%m-%d %H:%M"),
            style(&result.timezone).dim()
        );
        println!(
            "    {}  (reviewed {})",
            result.cite, result.last_reviewed
        );
        if let Some(notes) = &result.notes {
            println!("    {}", notes);
        }
        if let Some(trace) = &result.trace {
            println!("    {}", style(trace).dim());
        }
    }

    if let Some(path) = ics {
        std::fs::write(&path, to_ics(&results))?;
        println!(
            "{} Wrote {} event(s) to {}",
            style("✓").green(),
            results.len(),
            path.display()
        );
    }
    Ok(())
}

pub fn cmd_list(settings: &Settings, jurisdiction: &str) -> anyhow::Result<()> {
    let engine = RulesEngine::load(&settings.rules_dir())?;
    let pack = engine.pack(jurisdiction).ok_or_else(|| {
        crate::error::RexError::ConfigError(format!(
            "unknown jurisdiction '{}'; loaded: {}",
            jurisdiction,
            engine.jurisdictions().join(", ")
        ))
    })?;

    println!(
        "{} ({} · updated {})",
        style(&pack.state).bold(),
        pack.timezone,
        pack.last_updated
    );
    for (event, rules) in &pack.events {
        println!("  {}", style(event).bold());
        for rule in &rules.deadlines {
            println!(
                "    {} — +{}d{}{}  {}",
                rule.name,
                rule.offset.days,
                if rule.offset.skip_weekends { ", skip weekends" } else { "" },
                if rule.offset.skip_holidays { ", skip holidays" } else { "" },
                style(&rule.cite).dim()
            );
        }
    }
    Ok(())
}
