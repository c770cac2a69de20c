//! Plan/apply redaction.
//!
//! Planning scans extracted text through the detector port and records
//! regions per document. Applying re-hashes every input and aborts on any
//! drift; redactions are cryptographic deletions written atomically per
//! document. Preview mode renders side-by-side original-vs-redacted
//! comparisons without touching the originals or producing final
//! artifacts. Nothing here needs the network.

mod burn;
mod detector;
mod preview;

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use burn::burn_pdf;
pub use detector::{PiiDetectorPort, PiiSpan, RegexPiiDetector};
pub use preview::compose_side_by_side;

use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::determinism::{iso_now, sha256_file, sha256_hex, stamp_metadata, SchemaStamp};
use crate::error::{Result, RexError};
use crate::models::{DocType, ManifestRecord};

pub const PLAN_SCHEMA_ID: &str = "rexlit.redaction_plan";
pub const PLAN_SCHEMA_VERSION: u32 = 1;

/// Estimated text line height used to approximate rectangles when the
/// detector has no page layout.
const LINE_HEIGHT: f32 = 14.0;
const CHAR_WIDTH: f32 = 6.0;
const PAGE_TOP: f32 = 752.0;
const PAGE_LEFT: f32 = 72.0;

/// One region to remove.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedactionRegion {
    /// 1-based page number.
    pub page: u32,
    pub entity_type: String,
    /// [x, y, width, height] in PDF points.
    pub rect: [f32; 4],
    pub rationale: String,
    /// Char offsets into the page's extracted text.
    pub start: usize,
    pub end: usize,
}

/// All planned regions for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRedactions {
    pub document_sha256: String,
    pub path: String,
    pub regions: Vec<RedactionRegion>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Plan header line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanHeader {
    pub plan_id: String,
    /// Aggregate hash over the sorted input hashes.
    pub input_hash: String,
    pub detector: String,
    pub detector_version: String,
    pub pii_types: BTreeSet<String>,
    pub created_at: String,
    #[serde(flatten)]
    pub stamp: SchemaStamp,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A parsed plan file.
#[derive(Debug, Clone)]
pub struct RedactionPlan {
    pub header: PlanHeader,
    pub documents: Vec<DocumentRedactions>,
}

/// Outcome of an apply run.
#[derive(Debug)]
pub struct RedactionOutcome {
    pub applied: Vec<PathBuf>,
    pub regions: usize,
    pub forced: usize,
    pub preview: bool,
}

/// Redaction planning and application.
pub struct RedactionService<'a> {
    settings: &'a Settings,
    ledger: &'a Ledger,
}

impl<'a> RedactionService<'a> {
    pub fn new(settings: &'a Settings, ledger: &'a Ledger) -> Self {
        Self { settings, ledger }
    }

    /// Scan documents and write a plan. `plan_id` is a pure function of
    /// the sorted input hashes and the detector version.
    pub fn plan(
        &self,
        records: &[ManifestRecord],
        detector: &dyn PiiDetectorPort,
    ) -> Result<(RedactionPlan, PathBuf)> {
        let mut input_hashes: Vec<String> = records
            .iter()
            .map(|r| r.document.sha256.clone())
            .collect();
        input_hashes.sort_unstable();
        let input_hash = sha256_hex(input_hashes.join("\n").as_bytes());
        let plan_id = sha256_hex(
            format!("{}\n{}", input_hashes.join("\n"), detector.version()).as_bytes(),
        );

        let mut documents = Vec::new();
        let mut pii_types: BTreeSet<String> = BTreeSet::new();
        for record in records {
            let regions = scan_document(record, detector);
            for region in &regions {
                pii_types.insert(region.entity_type.clone());
            }
            if !regions.is_empty() {
                documents.push(DocumentRedactions {
                    document_sha256: record.document.sha256.clone(),
                    path: record.path_str(),
                    regions,
                    extra: serde_json::Map::new(),
                });
            }
        }

        let body = serde_json::json!({
            "plan_id": plan_id,
            "input_hash": input_hash,
            "detector": detector.name(),
            "detector_version": detector.version(),
        });
        let header = PlanHeader {
            plan_id: plan_id.clone(),
            input_hash,
            detector: detector.name().to_string(),
            detector_version: detector.version().to_string(),
            pii_types,
            created_at: iso_now(),
            stamp: stamp_metadata(&body, PLAN_SCHEMA_ID, PLAN_SCHEMA_VERSION)?,
            extra: serde_json::Map::new(),
        };

        let path = self
            .settings
            .redaction_plans_dir()
            .join(format!("{}.jsonl", &plan_id[..16]));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&path)?;
        let mut line = serde_json::to_string(&header)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        for doc in &documents {
            let mut line = serde_json::to_string(doc)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }
        file.sync_all()?;

        self.ledger.log_with_versions(
            Operation::RedactionPlan,
            records.iter().map(|r| r.document.sha256.clone()).collect(),
            vec![path.to_string_lossy().into_owned()],
            serde_json::json!({
                "plan_id": plan_id,
                "documents_with_findings": documents.len(),
                "documents_scanned": records.len(),
            }),
            &[(detector.name(), detector.version())],
        )?;

        Ok((RedactionPlan { header, documents }, path))
    }

    /// Read a plan file back.
    pub fn load_plan(&self, path: &Path) -> Result<RedactionPlan> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header: PlanHeader = serde_json::from_str(lines.next().ok_or_else(|| {
            RexError::ConfigError(format!("empty plan file {}", path.display()))
        })?)?;
        let mut documents = Vec::new();
        for line in lines {
            documents.push(serde_json::from_str(line)?);
        }
        Ok(RedactionPlan { header, documents })
    }

    /// Apply a plan. Every input is re-hashed first; drift aborts with a
    /// HashMismatch unless `force`, which logs a dedicated override entry
    /// per drifted document and proceeds.
    ///
    /// Preview mode renders side-by-side comparisons under
    /// `redactions/out/preview/` instead of final artifacts: PDFs become
    /// one comparison document per input (original left, redacted right),
    /// other formats get paired original/redacted copies. Originals are
    /// never modified in either mode.
    pub fn apply(
        &self,
        plan: &RedactionPlan,
        force: bool,
        preview: bool,
    ) -> Result<RedactionOutcome> {
        let out_dir = if preview {
            self.settings.redactions_out_dir().join("preview")
        } else {
            self.settings.redactions_out_dir()
        };
        std::fs::create_dir_all(&out_dir)?;

        let mut applied = Vec::new();
        let mut regions_total = 0usize;
        let mut forced = 0usize;

        for doc in &plan.documents {
            let path = PathBuf::from(&doc.path);
            let actual = sha256_file(&path).map_err(|e| RexError::ExtractionFailure {
                path: path.clone(),
                reason: format!("cannot re-hash input: {}", e),
            })?;
            if actual != doc.document_sha256 {
                if !force {
                    return Err(RexError::HashMismatch {
                        path,
                        expected: doc.document_sha256.clone(),
                        actual,
                    });
                }
                forced += 1;
                self.ledger.log(
                    Operation::RedactionForceOverride,
                    vec![doc.document_sha256.clone(), actual.clone()],
                    vec![],
                    serde_json::json!({
                        "plan_id": plan.header.plan_id,
                        "path": doc.path,
                        "expected_hash": doc.document_sha256,
                        "actual_hash": actual,
                    }),
                )?;
            }

            if preview {
                let mut outputs = preview_document(&path, &out_dir, doc)?;
                regions_total += doc.regions.len();
                applied.append(&mut outputs);
            } else {
                let output = out_dir.join(output_name(&path, &doc.document_sha256));
                apply_document(&path, &output, doc)?;
                regions_total += doc.regions.len();
                applied.push(output);
            }
        }

        self.ledger.log(
            Operation::RedactionApply,
            plan.documents
                .iter()
                .map(|d| d.document_sha256.clone())
                .collect(),
            applied
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            serde_json::json!({
                "plan_id": plan.header.plan_id,
                "documents": plan.documents.len(),
                "regions": regions_total,
                "preview": preview,
                "forced": forced,
                "failures": [],
            }),
        )?;

        Ok(RedactionOutcome {
            applied,
            regions: regions_total,
            forced,
            preview,
        })
    }
}

fn output_name(input: &Path, sha256: &str) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}_{}.redacted.{}", stem, &sha256[..16.min(sha256.len())], ext)
}

/// Render comparison artifacts for one document under `preview_dir`.
///
/// PDFs become a single side-by-side comparison document; other formats
/// get an original copy next to the redacted rendition. The input file is
/// read only.
fn preview_document(
    input: &Path,
    preview_dir: &Path,
    doc: &DocumentRedactions,
) -> Result<Vec<PathBuf>> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bin".to_string());
    let sha = &doc.document_sha256[..16.min(doc.document_sha256.len())];

    if ext.eq_ignore_ascii_case("pdf") {
        let redacted = tempfile::NamedTempFile::new_in(preview_dir)?;
        burn_pdf(input, redacted.path(), &doc.regions).map_err(|e| {
            RexError::ExtractionFailure {
                path: input.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        let compare = preview_dir.join(format!("{}_{}.compare.pdf", stem, sha));
        preview::compose_side_by_side(input, redacted.path(), &compare).map_err(|e| {
            RexError::ExtractionFailure {
                path: input.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        Ok(vec![compare])
    } else {
        let original_copy = preview_dir.join(format!("{}_{}.original.{}", stem, sha, ext));
        let redacted_copy = preview_dir.join(format!("{}_{}.redacted.{}", stem, sha, ext));
        std::fs::copy(input, &original_copy)?;
        let text = std::fs::read_to_string(input).unwrap_or_else(|_| {
            String::from_utf8_lossy(&std::fs::read(input).unwrap_or_default()).into_owned()
        });
        std::fs::write(&redacted_copy, redact_text(&text, &doc.regions))?;
        Ok(vec![original_copy, redacted_copy])
    }
}

/// Redact one document into `output`, atomically (temp file + rename).
fn apply_document(
    input: &Path,
    output: &Path,
    doc: &DocumentRedactions,
) -> Result<()> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let is_pdf = input
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    if is_pdf {
        burn_pdf(input, tmp.path(), &doc.regions).map_err(|e| {
            RexError::ExtractionFailure {
                path: input.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    } else {
        let text = std::fs::read_to_string(input).unwrap_or_else(|_| {
            String::from_utf8_lossy(&std::fs::read(input).unwrap_or_default()).into_owned()
        });
        let redacted = redact_text(&text, &doc.regions);
        std::fs::write(tmp.path(), redacted)?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| RexError::Io(e.error))?;
    Ok(())
}

/// Replace planned spans with block glyphs, preserving layout. Span
/// offsets are byte offsets into the extracted text.
fn redact_text(text: &str, regions: &[RedactionRegion]) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        let inside = regions.iter().any(|r| i >= r.start && i < r.end);
        if inside && c != '\n' {
            out.push('\u{2588}');
        } else {
            out.push(c);
        }
    }
    out
}

/// Detect spans per page and approximate rectangles from line/column
/// positions. Adapters with real layout replace the geometry, not the
/// flow.
fn scan_document(record: &ManifestRecord, detector: &dyn PiiDetectorPort) -> Vec<RedactionRegion> {
    let mut regions = Vec::new();
    // Page-aware formats split on form feeds; everything else is one page.
    let pages: Vec<&str> = if record.document.doctype == DocType::Pdf {
        record.document.text.split('\u{c}').collect()
    } else {
        vec![record.document.text.as_str()]
    };
    let mut offset = 0usize;
    for (page_index, page_text) in pages.iter().enumerate() {
        for span in detector.detect(page_text) {
            let (line, column) = line_column(page_text, span.start);
            let width = (span.end - span.start) as f32 * CHAR_WIDTH;
            regions.push(RedactionRegion {
                page: page_index as u32 + 1,
                entity_type: span.entity_type.clone(),
                rect: [
                    PAGE_LEFT + column as f32 * CHAR_WIDTH,
                    (PAGE_TOP - line as f32 * LINE_HEIGHT - 2.0).max(0.0),
                    width,
                    LINE_HEIGHT - 2.0,
                ],
                rationale: format!("{} pattern match", span.entity_type),
                start: if record.document.doctype == DocType::Pdf {
                    span.start
                } else {
                    offset + span.start
                },
                end: if record.document.doctype == DocType::Pdf {
                    span.end
                } else {
                    offset + span.end
                },
            });
        }
        offset += page_text.len() + 1;
    }
    regions
}

fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut line = 0usize;
    let mut column = 0usize;
    for (i, c) in text.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    (line, column)
}
