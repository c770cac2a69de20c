//! Rule pack data model.
//!
//! Packs are YAML documents loaded read-only at engine construction.
//! Holiday sets are named and referenced from offsets, never embedded in
//! the rules themselves.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RexError};

/// Day-offset specification for one deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offset {
    pub days: i64,
    #[serde(default)]
    pub skip_weekends: bool,
    #[serde(default)]
    pub skip_holidays: bool,
    /// Named holiday set consulted when `skip_holidays` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holiday_set: Option<String>,
}

/// One deadline rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineRule {
    pub name: String,
    pub cite: String,
    pub offset: Offset,
    /// Local wall-clock time, "HH:MM".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    pub last_reviewed: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DeadlineRule {
    /// Parse `time_of_day`, defaulting to end of business.
    pub fn local_time(&self) -> Result<NaiveTime> {
        match &self.time_of_day {
            None => Ok(NaiveTime::from_hms_opt(17, 0, 0).expect("valid time")),
            Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| {
                RexError::ConfigError(format!(
                    "bad time_of_day '{}' for {}: {}",
                    raw, self.name, e
                ))
            }),
        }
    }
}

/// Deadlines triggered by one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRules {
    pub deadlines: Vec<DeadlineRule>,
}

/// A jurisdiction's rule pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePack {
    pub state: String,
    pub schema_version: u32,
    pub last_updated: NaiveDate,
    /// IANA name of the jurisdiction's civil time zone.
    pub timezone: String,
    #[serde(default)]
    pub holidays: BTreeMap<String, Vec<NaiveDate>>,
    pub events: BTreeMap<String, EventRules>,
}

impl RulePack {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RexError::ConfigError(format!("invalid rule pack: {}", e)))
    }

    /// Whether a date is in the named holiday set.
    pub fn is_holiday(&self, set: Option<&str>, date: NaiveDate) -> bool {
        match set {
            Some(name) => self
                .holidays
                .get(name)
                .map(|dates| dates.contains(&date))
                .unwrap_or(false),
            // With no set named, any known holiday counts.
            None => self.holidays.values().any(|dates| dates.contains(&date)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
state: TX
schema_version: 1
last_updated: 2025-06-01
timezone: America/Chicago
holidays:
  tx_courts:
    - 2025-11-27
    - 2025-12-25
events:
  served_petition:
    deadlines:
      - name: answer_due
        cite: "Tex. R. Civ. P. 99(b)"
        offset:
          days: 20
          skip_weekends: true
        time_of_day: "10:00"
        last_reviewed: 2025-06-01
        notes: "Answer due by 10:00 a.m."
"#;

    #[test]
    fn test_parse_pack() {
        let pack = RulePack::parse(SAMPLE).unwrap();
        assert_eq!(pack.state, "TX");
        assert_eq!(pack.timezone, "America/Chicago");
        let event = &pack.events["served_petition"];
        assert_eq!(event.deadlines.len(), 1);
        let rule = &event.deadlines[0];
        assert_eq!(rule.cite, "Tex. R. Civ. P. 99(b)");
        assert_eq!(rule.offset.days, 20);
        assert!(rule.offset.skip_weekends);
        assert!(!rule.offset.skip_holidays);
        assert_eq!(
            rule.local_time().unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_holiday_lookup() {
        let pack = RulePack::parse(SAMPLE).unwrap();
        let thanksgiving = NaiveDate::from_ymd_opt(2025, 11, 27).unwrap();
        assert!(pack.is_holiday(Some("tx_courts"), thanksgiving));
        assert!(pack.is_holiday(None, thanksgiving));
        assert!(!pack.is_holiday(Some("missing_set"), thanksgiving));
        assert!(!pack.is_holiday(None, NaiveDate::from_ymd_opt(2025, 11, 28).unwrap()));
    }

    #[test]
    fn test_bad_time_rejected() {
        let rule = DeadlineRule {
            name: "x".into(),
            cite: "c".into(),
            offset: Offset {
                days: 1,
                skip_weekends: false,
                skip_holidays: false,
                holiday_set: None,
            },
            time_of_day: Some("25:99".into()),
            last_reviewed: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            notes: None,
        };
        assert!(rule.local_time().is_err());
    }
}
