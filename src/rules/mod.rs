//! Jurisdictional deadline calculator.
//!
//! Rule packs for Texas and Florida load read-only at engine
//! construction; `calculate` is a pure function of its arguments and the
//! loaded packs. All date arithmetic happens in the jurisdiction's civil
//! time zone as declared by the pack.

mod ics;
mod pack;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

pub use ics::to_ics;
pub use pack::{DeadlineRule, EventRules, Offset, RulePack};

use crate::error::{Result, RexError};

const TX_PACK: &str = include_str!("packs/tx.yaml");
const FL_PACK: &str = include_str!("packs/fl.yaml");

/// How the triggering papers were served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMethod {
    Personal,
    Mail,
    Eservice,
}

impl ServiceMethod {
    /// Extra days added for the service method. Mail adds three.
    fn extra_days(&self) -> i64 {
        match self {
            Self::Mail => 3,
            Self::Personal | Self::Eservice => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Mail => "mail",
            Self::Eservice => "eservice",
        }
    }
}

/// One computed deadline with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineResult {
    pub jurisdiction: String,
    pub event: String,
    pub name: String,
    pub cite: String,
    /// Local wall-clock due date/time in the pack's time zone.
    pub due: NaiveDateTime,
    /// IANA zone name the arithmetic was performed in.
    pub timezone: String,
    pub last_reviewed: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// One-line arithmetic trace, present when `explain` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Deadline calculator over loaded packs.
pub struct RulesEngine {
    packs: BTreeMap<String, RulePack>,
}

impl RulesEngine {
    /// Engine over the packaged TX and FL rule definitions.
    pub fn builtin() -> Result<Self> {
        let mut packs = BTreeMap::new();
        for source in [TX_PACK, FL_PACK] {
            let pack = RulePack::parse(source)?;
            packs.insert(pack.state.clone(), pack);
        }
        Ok(Self { packs })
    }

    /// Engine over packs in a directory, falling back to the packaged
    /// definitions for any missing state.
    pub fn load(rules_dir: &Path) -> Result<Self> {
        let mut engine = Self::builtin()?;
        if rules_dir.is_dir() {
            for entry in std::fs::read_dir(rules_dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "yaml" || e == "yml") == Some(true) {
                    let pack = RulePack::parse(&std::fs::read_to_string(&path)?)?;
                    engine.packs.insert(pack.state.clone(), pack);
                }
            }
        }
        Ok(engine)
    }

    /// Write the packaged packs into the data home for operator review.
    pub fn materialize_defaults(rules_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(rules_dir)?;
        for (name, source) in [("tx.yaml", TX_PACK), ("fl.yaml", FL_PACK)] {
            let path = rules_dir.join(name);
            if !path.exists() {
                std::fs::write(&path, source)?;
            }
        }
        Ok(())
    }

    pub fn jurisdictions(&self) -> Vec<&str> {
        self.packs.keys().map(String::as_str).collect()
    }

    pub fn pack(&self, jurisdiction: &str) -> Option<&RulePack> {
        self.packs.get(&jurisdiction.to_ascii_uppercase())
    }

    /// Resolve every deadline the pack declares for `event`.
    pub fn calculate(
        &self,
        jurisdiction: &str,
        event: &str,
        base_date: NaiveDate,
        service: ServiceMethod,
        explain: bool,
    ) -> Result<Vec<DeadlineResult>> {
        let pack = self.pack(jurisdiction).ok_or_else(|| {
            RexError::ConfigError(format!(
                "unknown jurisdiction '{}'; loaded: {}",
                jurisdiction,
                self.jurisdictions().join(", ")
            ))
        })?;
        let rules = pack.events.get(event).ok_or_else(|| {
            RexError::ConfigError(format!(
                "unknown event '{}' for {}; known events: {}",
                event,
                pack.state,
                pack.events.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let mut results = Vec::with_capacity(rules.deadlines.len());
        for rule in &rules.deadlines {
            results.push(resolve(pack, event, rule, base_date, service, explain)?);
        }
        Ok(results)
    }
}

fn resolve(
    pack: &RulePack,
    event: &str,
    rule: &DeadlineRule,
    base_date: NaiveDate,
    service: ServiceMethod,
    explain: bool,
) -> Result<DeadlineResult> {
    let mut steps: Vec<String> = Vec::new();

    let mut date = base_date + chrono::Duration::days(rule.offset.days);
    steps.push(format!("{} +{}d = {}", base_date, rule.offset.days, date));

    let service_days = service.extra_days();
    if service_days != 0 {
        date += chrono::Duration::days(service_days);
        steps.push(format!("{} service +{}d = {}", service.as_str(), service_days, date));
    }

    // Advance past weekends and named holidays until the date is a
    // counting day under the rule.
    loop {
        if rule.offset.skip_weekends
            && matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        {
            date += chrono::Duration::days(1);
            steps.push(format!("weekend -> {}", date));
            continue;
        }
        if rule.offset.skip_holidays
            && pack.is_holiday(rule.offset.holiday_set.as_deref(), date)
        {
            date += chrono::Duration::days(1);
            steps.push(format!("holiday -> {}", date));
            continue;
        }
        break;
    }

    let time = rule.local_time()?;
    let due = NaiveDateTime::new(date, time);
    steps.push(format!("at {} {}", time.format("%H:%M"), pack.timezone));

    Ok(DeadlineResult {
        jurisdiction: pack.state.clone(),
        event: event.to_string(),
        name: rule.name.clone(),
        cite: rule.cite.clone(),
        due,
        timezone: pack.timezone.clone(),
        last_reviewed: rule.last_reviewed,
        notes: rule.notes.clone(),
        trace: explain.then(|| steps.join("; ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_tx_answer_deadline() {
        let engine = RulesEngine::builtin().unwrap();
        let results = engine
            .calculate(
                "TX",
                "served_petition",
                date(2025, 10, 22),
                ServiceMethod::Personal,
                false,
            )
            .unwrap();
        let answer = results.iter().find(|r| r.name == "answer_due").unwrap();
        assert_eq!(
            answer.due,
            NaiveDateTime::new(
                date(2025, 11, 11),
                chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap()
            )
        );
        assert!(answer.cite.contains("Tex. R. Civ. P. 99(b)"));
        assert_eq!(answer.timezone, "America/Chicago");
    }

    #[test]
    fn test_mail_service_adds_three_days() {
        let engine = RulesEngine::builtin().unwrap();
        let personal = engine
            .calculate(
                "TX",
                "served_petition",
                date(2025, 10, 20),
                ServiceMethod::Personal,
                false,
            )
            .unwrap();
        let mailed = engine
            .calculate(
                "TX",
                "served_petition",
                date(2025, 10, 20),
                ServiceMethod::Mail,
                false,
            )
            .unwrap();
        // Oct 20 + 20 = Nov 9 (Sun) -> Nov 10; mail: Nov 12 (Wed).
        assert_eq!(personal[0].due.date(), date(2025, 11, 10));
        assert_eq!(mailed[0].due.date(), date(2025, 11, 12));
    }

    #[test]
    fn test_weekend_and_holiday_skipping() {
        let engine = RulesEngine::builtin().unwrap();
        // Oct 28 + 30 = Nov 27 2025 (Thanksgiving, Thu) -> Nov 28 is a
        // listed court holiday -> Nov 29 Sat -> Nov 30 Sun -> Dec 1 Mon.
        let results = engine
            .calculate(
                "TX",
                "served_discovery",
                date(2025, 10, 28),
                ServiceMethod::Personal,
                true,
            )
            .unwrap();
        let due = &results[0];
        assert_eq!(due.due.date(), date(2025, 12, 1));
        let trace = due.trace.as_ref().unwrap();
        assert!(trace.contains("holiday"));
        assert!(trace.contains("weekend"));
    }

    #[test]
    fn test_calculate_is_pure() {
        let engine = RulesEngine::builtin().unwrap();
        let a = engine
            .calculate("FL", "served_complaint", date(2025, 3, 3), ServiceMethod::Mail, true)
            .unwrap();
        let b = engine
            .calculate("FL", "served_complaint", date(2025, 3, 3), ServiceMethod::Mail, true)
            .unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_unknown_jurisdiction_and_event() {
        let engine = RulesEngine::builtin().unwrap();
        assert!(engine
            .calculate("NY", "served_petition", date(2025, 1, 1), ServiceMethod::Personal, false)
            .is_err());
        assert!(engine
            .calculate("TX", "no_such_event", date(2025, 1, 1), ServiceMethod::Personal, false)
            .is_err());
    }

    #[test]
    fn test_materialize_defaults() {
        let dir = tempfile::tempdir().unwrap();
        RulesEngine::materialize_defaults(dir.path()).unwrap();
        assert!(dir.path().join("tx.yaml").exists());
        assert!(dir.path().join("fl.yaml").exists());
        let engine = RulesEngine::load(dir.path()).unwrap();
        assert_eq!(engine.jurisdictions(), vec!["FL", "TX"]);
    }
}
