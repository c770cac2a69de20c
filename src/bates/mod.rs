//! Two-phase Bates numbering: plan → preflight → apply.

mod plan;
mod registry;
pub(crate) mod stamp;

use std::path::{Path, PathBuf};

pub use plan::{build_plan, format_label, parse_label, BatesPlan, PlanEntry, PlanRequest};
pub use registry::{Conflict, Registry, RegistryRecord};
pub use stamp::{Anchor, LopdfStamper, PageStamp, StampError, StamperPort};

use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::error::{Result, RexError};
use crate::models::{DocType, ManifestRecord};

/// Result of an apply run.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub stamped: Vec<PathBuf>,
    pub page_stamps: Vec<PageStamp>,
    pub records: Vec<RegistryRecord>,
    pub forced_conflicts: usize,
}

/// Bates planning and application over the data home.
pub struct BatesService<'a> {
    settings: &'a Settings,
    ledger: &'a Ledger,
}

impl<'a> BatesService<'a> {
    pub fn new(settings: &'a Settings, ledger: &'a Ledger) -> Self {
        Self { settings, ledger }
    }

    fn plan_path(&self, prefix: &str) -> PathBuf {
        self.settings.bates_dir().join(format!("{}.plan.json", prefix))
    }

    fn stamped_dir(&self) -> PathBuf {
        self.settings.bates_dir().join("stamped")
    }

    /// Build and persist a plan; read-only with respect to documents.
    pub fn plan(
        &self,
        records: &[ManifestRecord],
        request: &PlanRequest,
    ) -> Result<(BatesPlan, PathBuf)> {
        let plan = build_plan(records, request);
        let path = self.plan_path(&request.prefix);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&plan)?)?;

        self.ledger.log(
            Operation::BatesPlan,
            plan.entries
                .iter()
                .map(|e| e.document_sha256.clone())
                .collect(),
            vec![path.to_string_lossy().into_owned()],
            serde_json::json!({
                "plan_id": plan.plan_id,
                "prefix": plan.prefix,
                "start": request.start,
                "width": plan.width,
                "documents": plan.entries.len(),
                "pages": plan.total_pages(),
            }),
        )?;
        Ok((plan, path))
    }

    /// Load a previously persisted plan for a prefix.
    pub fn load_plan(&self, prefix: &str) -> Result<BatesPlan> {
        let path = self.plan_path(prefix);
        if !path.exists() {
            return Err(RexError::ConfigError(format!(
                "no plan for prefix '{}'; run `bates plan` first",
                prefix
            )));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(&path)?)?)
    }

    /// Preflight then stamp. Collisions abort unless `force`, which emits
    /// a `bates_force_override` entry listing every conflict.
    pub fn apply(
        &self,
        plan: &BatesPlan,
        records: &[ManifestRecord],
        stamper: &dyn StamperPort,
        anchor: Anchor,
        backing: bool,
        force: bool,
    ) -> Result<ApplyOutcome> {
        let registry = Registry::new(&self.settings.bates_dir(), &plan.prefix);
        registry.verify_monotonic()?;
        let conflicts = registry.preflight(plan)?;
        if !conflicts.is_empty() {
            if !force {
                return Err(RexError::BatesCollision {
                    prefix: plan.prefix.clone(),
                    conflicts: conflicts.len(),
                });
            }
            self.ledger.log(
                Operation::BatesForceOverride,
                conflicts
                    .iter()
                    .map(|c| c.document_sha256.clone())
                    .collect(),
                vec![],
                serde_json::json!({
                    "plan_id": plan.plan_id,
                    "prefix": plan.prefix,
                    "conflicts": conflicts,
                }),
            )?;
        }

        let by_sha: std::collections::BTreeMap<&str, &ManifestRecord> = records
            .iter()
            .map(|r| (r.document.sha256.as_str(), r))
            .collect();

        let out_dir = self.stamped_dir();
        std::fs::create_dir_all(&out_dir)?;
        let mut stamped = Vec::with_capacity(plan.entries.len());
        let mut page_stamps = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for entry in &plan.entries {
            let labels: Vec<String> = (entry.start_number..=entry.end_number)
                .map(|n| plan.label(n))
                .collect();
            let output = out_dir.join(format!(
                "{}_{}.pdf",
                plan.label(entry.start_number),
                &entry.document_sha256[..16.min(entry.document_sha256.len())]
            ));
            let record = by_sha.get(entry.document_sha256.as_str());
            let result = match record {
                Some(r) if r.document.doctype == DocType::Pdf => {
                    stamper.stamp(&r.document.path, &output, &labels, anchor, backing)
                }
                Some(r) => {
                    // Non-PDF documents get a stamped slip-sheet standing
                    // in for the native file.
                    render_slipsheet(&r.document.path, &output, &labels)
                        .and_then(|_| stamper.stamp(&output, &output, &labels, anchor, backing))
                }
                None => Err(StampError::Pdf(format!(
                    "document {} missing from manifest",
                    entry.document_sha256
                ))),
            };
            match result {
                Ok(mut stamps) => {
                    page_stamps.append(&mut stamps);
                    stamped.push(output);
                }
                Err(e) => {
                    tracing::warn!(
                        "stamping failed for {}: {}",
                        entry.document_sha256,
                        e
                    );
                    failures.push(format!("{}: {}", entry.document_sha256, e));
                }
            }
        }

        if !failures.is_empty() && stamped.is_empty() {
            return Err(RexError::ExtractionFailure {
                path: self.stamped_dir(),
                reason: format!("all {} documents failed to stamp", failures.len()),
            });
        }

        let applied = registry.append_applied(plan)?;
        registry.verify_monotonic()?;

        self.ledger.log(
            Operation::BatesApply,
            plan.entries
                .iter()
                .map(|e| e.document_sha256.clone())
                .collect(),
            stamped
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            serde_json::json!({
                "plan_id": plan.plan_id,
                "prefix": plan.prefix,
                "documents": plan.entries.len(),
                "pages": plan.total_pages(),
                "forced": force && !conflicts.is_empty(),
                "failures": failures,
            }),
        )?;

        Ok(ApplyOutcome {
            stamped,
            page_stamps,
            records: applied,
            forced_conflicts: conflicts.len(),
        })
    }
}

/// Generate a one-page-per-label placeholder PDF referencing the native
/// file. Used when the production copy of a non-PDF document is stamped.
fn render_slipsheet(native: &Path, output: &Path, labels: &[String]) -> std::result::Result<(), StampError> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for _ in labels {
        let text = format!(
            "BT /F1 11 Tf 72 720 Td (Native file produced: {}) Tj ET",
            native
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
                .replace('\\', "")
                .replace('(', "[")
                .replace(')', "]"),
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(output).map_err(|e| StampError::Pdf(e.to_string()))?;
    Ok(())
}
