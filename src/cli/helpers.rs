//! Shared CLI helpers.

use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::Ledger;
use crate::config::Settings;
use crate::error::Result;
use crate::manifest::read_manifest;
use crate::models::ManifestRecord;

/// Spinner-style progress bar for unbounded work.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({pos})") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar
}

/// Counting progress bar for bounded work.
pub fn progress(len: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar
}

/// Open the ledger at the configured path.
pub fn open_ledger(settings: &Settings) -> Result<Ledger> {
    Ledger::open(&settings.audit_path)
}

/// Load the manifest or explain that ingest must run first.
pub fn load_manifest(settings: &Settings) -> Result<Vec<ManifestRecord>> {
    read_manifest(&settings.manifest_path())
}
