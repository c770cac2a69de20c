//! Secure streaming ingest.
//!
//! Walks the boundary-enforced discovery stream, content-addresses every
//! accepted file, extracts text, and writes the sorted manifest. Each file
//! gets one `ingest` audit entry; extraction failures become placeholder
//! documents and never abort the run.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::determinism::{sha256_file, sha256_hex};
use crate::discovery::{Discovered, DiscoveryConfig, FileEntry, Walker};
use crate::error::Result;
use crate::extract::{ExtractorSet, TesseractOcr};
use crate::manifest::write_manifest;
use crate::models::{DocType, Document, ManifestRecord};
use crate::utils::{detect_mime, extension_of, CancelFlag};

/// Progress events for UI layers.
#[derive(Debug)]
pub enum IngestEvent {
    Started { root: PathBuf },
    FileIngested { path: PathBuf, sha256: String },
    FileFailed { path: PathBuf, reason: String },
    BoundaryViolation { path: PathBuf },
}

/// Outcome of an ingest run.
#[derive(Debug)]
pub struct IngestOutcome {
    pub documents: usize,
    pub failures: Vec<String>,
    pub boundary_violations: Vec<(PathBuf, PathBuf)>,
    pub manifest_path: PathBuf,
}

/// Ingest pipeline.
pub struct IngestService<'a> {
    settings: &'a Settings,
    ledger: &'a Ledger,
    extractors: ExtractorSet,
}

impl<'a> IngestService<'a> {
    pub fn new(settings: &'a Settings, ledger: &'a Ledger) -> Self {
        Self {
            settings,
            ledger,
            extractors: ExtractorSet::default(),
        }
    }

    /// Run ingest over `root`, writing the manifest under the data home.
    pub fn run(
        &self,
        root: &Path,
        cancel: &CancelFlag,
        mut progress: impl FnMut(&IngestEvent),
    ) -> Result<IngestOutcome> {
        let walker = Walker::new(
            root,
            DiscoveryConfig {
                include_hidden: self.settings.include_hidden,
            },
        )?;
        progress(&IngestEvent::Started {
            root: walker.root().to_path_buf(),
        });

        let mut records: Vec<ManifestRecord> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut violations: Vec<(PathBuf, PathBuf)> = Vec::new();

        for event in walker.discover() {
            if cancel.is_cancelled() {
                tracing::info!("ingest cancelled after {} documents", records.len());
                break;
            }
            match event {
                Discovered::Entry(entry) => {
                    match self.ingest_file(walker.root(), &entry) {
                        Ok(record) => {
                            if record.document.extraction_failed {
                                failures.push(record.path_str());
                                progress(&IngestEvent::FileFailed {
                                    path: entry.path.clone(),
                                    reason: "extraction failed".into(),
                                });
                            } else {
                                progress(&IngestEvent::FileIngested {
                                    path: entry.path.clone(),
                                    sha256: record.sha256().to_string(),
                                });
                            }
                            records.push(record);
                        }
                        Err(e) => {
                            tracing::warn!("skipping {}: {}", entry.path.display(), e);
                            failures.push(format!("{}: {}", entry.path.display(), e));
                            progress(&IngestEvent::FileFailed {
                                path: entry.path.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Discovered::BoundaryViolation { path, resolved } => {
                    progress(&IngestEvent::BoundaryViolation { path: path.clone() });
                    violations.push((path, resolved));
                }
                Discovered::IoSkipped { path, reason } => {
                    failures.push(format!("{}: {}", path.display(), reason));
                }
            }
        }

        let manifest_path = self.settings.manifest_path();
        let documents = write_manifest(&manifest_path, records)?;

        Ok(IngestOutcome {
            documents,
            failures,
            boundary_violations: violations,
            manifest_path,
        })
    }

    /// Hash, extract, and audit a single accepted file.
    fn ingest_file(&self, root: &Path, entry: &FileEntry) -> Result<ManifestRecord> {
        let sha256 = sha256_file(&entry.path)?;

        let mut head = [0u8; 512];
        let head_len = {
            let mut file = std::fs::File::open(&entry.path)?;
            file.read(&mut head)?
        };
        let mime_type = detect_mime(&head[..head_len], &entry.path);
        let extension = extension_of(&entry.path);
        let doctype = DocType::from_extension(&extension);
        let custodian = Document::custodian_for(root, &entry.path);

        let (text, page_count, extraction_failed) =
            match self.extractors.for_document(&mime_type, &extension) {
                Some(extractor) => match extractor.extract_text(&entry.path) {
                    Ok(extracted) => (extracted.text, extracted.page_count, false),
                    Err(e) => {
                        tracing::warn!("extraction failed for {}: {}", entry.path.display(), e);
                        (String::new(), None, true)
                    }
                },
                None => {
                    tracing::debug!(
                        "no extractor for {} ({}); storing metadata only",
                        entry.path.display(),
                        mime_type
                    );
                    (String::new(), None, true)
                }
            };

        let family_id = if doctype == DocType::Email {
            email_family_id(&entry.path)
        } else {
            None
        };

        let document = Document {
            sha256: sha256.clone(),
            path: entry.path.clone(),
            size: entry.size,
            mtime: entry.mtime,
            mime_type: mime_type.clone(),
            custodian: custodian.clone(),
            doctype,
            text,
            page_count,
            language: None,
            family_id,
            extraction_failed,
            privileged: None,
            responsive: None,
            production: None,
        };
        let record = ManifestRecord::stamp(document)?;

        self.ledger.log(
            Operation::Ingest,
            vec![sha256],
            vec![entry.path.to_string_lossy().into_owned()],
            serde_json::json!({
                "custodian": custodian,
                "doctype": doctype.as_str(),
                "mime_type": mime_type,
                "size": entry.size,
                "page_count": page_count,
                "extraction_failed": extraction_failed,
            }),
        )?;

        Ok(record)
    }
}

/// Thread hash for an email file: the normalized thread subject when
/// present, else the message id. Documents in the same thread share it.
fn email_family_id(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let message = mail_parser::MessageParser::default().parse(&bytes)?;
    let key = message
        .thread_name()
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .or_else(|| message.message_id().map(|s| s.to_string()))?;
    Some(sha256_hex(key.as_bytes()))
}

/// Whether the OCR fallback chain is available on this host.
pub fn ocr_available() -> bool {
    TesseractOcr::available()
}
