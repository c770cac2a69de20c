//! PII detection port.
//!
//! The default adapter is a fully offline regex detector; model-backed
//! detectors plug in behind the same port. Detector identity and version
//! are folded into every plan id so a detector upgrade invalidates plans.

use regex::Regex;

/// A detected span within one text, by char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiSpan {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
}

/// Detector port.
pub trait PiiDetectorPort: Send + Sync {
    fn detect(&self, text: &str) -> Vec<PiiSpan>;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// The entity types this detector can produce.
    fn pii_types(&self) -> Vec<String>;
}

/// Offline regex detector for common US PII shapes.
pub struct RegexPiiDetector {
    rules: Vec<(String, Regex)>,
}

impl Default for RegexPiiDetector {
    fn default() -> Self {
        let patterns: [(&str, &str); 6] = [
            ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
            ("ein", r"\b\d{2}-\d{7}\b"),
            ("phone", r"\b\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b"),
            ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            ("credit_card", r"\b(?:\d{4}[ -]){3}\d{4}\b"),
            ("dob", r"\b(?:0?[1-9]|1[0-2])/(?:0?[1-9]|[12]\d|3[01])/(?:19|20)\d{2}\b"),
        ];
        Self {
            rules: patterns
                .into_iter()
                .map(|(name, pattern)| {
                    (
                        name.to_string(),
                        Regex::new(pattern).expect("pattern is valid"),
                    )
                })
                .collect(),
        }
    }
}

impl PiiDetectorPort for RegexPiiDetector {
    fn detect(&self, text: &str) -> Vec<PiiSpan> {
        let mut spans = Vec::new();
        for (entity_type, regex) in &self.rules {
            for found in regex.find_iter(text) {
                spans.push(PiiSpan {
                    start: found.start(),
                    end: found.end(),
                    entity_type: entity_type.clone(),
                });
            }
        }
        // Stable order; drop spans fully contained in an earlier one so
        // e.g. an SSN isn't also reported as a phone fragment.
        spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        let mut kept: Vec<PiiSpan> = Vec::new();
        for span in spans {
            if kept
                .iter()
                .any(|k| k.start <= span.start && span.end <= k.end)
            {
                continue;
            }
            kept.push(span);
        }
        kept
    }

    fn name(&self) -> &str {
        "regex-pii"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn pii_types(&self) -> Vec<String> {
        self.rules.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_ssn() {
        let detector = RegexPiiDetector::default();
        let spans = detector.detect("SSN on file: 123-45-6789 per HR.");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity_type, "ssn");
        assert_eq!(
            &"SSN on file: 123-45-6789 per HR."[spans[0].start..spans[0].end],
            "123-45-6789"
        );
    }

    #[test]
    fn test_detects_email_and_phone() {
        let detector = RegexPiiDetector::default();
        let spans = detector.detect("reach jane.doe@example.com or (512) 555-0100");
        let types: Vec<&str> = spans.iter().map(|s| s.entity_type.as_str()).collect();
        assert!(types.contains(&"email"));
        assert!(types.contains(&"phone"));
    }

    #[test]
    fn test_nested_span_suppressed() {
        let detector = RegexPiiDetector::default();
        let spans = detector.detect("card 4111 1111 1111 1111 on record");
        let card: Vec<&PiiSpan> = spans
            .iter()
            .filter(|s| s.entity_type == "credit_card")
            .collect();
        assert_eq!(card.len(), 1);
        // No phone match inside the card digits survives.
        assert!(spans
            .iter()
            .all(|s| s.entity_type == "credit_card" || s.end <= card[0].start || s.start >= card[0].end));
    }

    #[test]
    fn test_clean_text_has_no_spans() {
        let detector = RegexPiiDetector::default();
        assert!(detector
            .detect("quarterly revenue discussion, nothing personal")
            .is_empty());
    }

    #[test]
    fn test_detector_is_versioned() {
        let detector = RegexPiiDetector::default();
        assert!(!detector.version().is_empty());
        assert!(detector.pii_types().contains(&"ssn".to_string()));
    }
}
