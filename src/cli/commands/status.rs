//! Status command.

use console::style;

use crate::audit::Ledger;
use crate::config::Settings;
use crate::index::MetadataCache;
use crate::utils::format_size;

pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    println!("{} {}", style("home").bold(), settings.home.display());

    match std::fs::metadata(settings.manifest_path()) {
        Ok(meta) => {
            let lines = std::fs::read_to_string(settings.manifest_path())
                .map(|s| s.lines().count())
                .unwrap_or(0);
            println!(
                "{} {} documents ({})",
                style("manifest").bold(),
                lines,
                format_size(meta.len())
            );
        }
        Err(_) => println!("{} not ingested", style("manifest").bold()),
    }

    match MetadataCache::load(&settings.metadata_cache_path()) {
        Ok(cache) => {
            println!(
                "{} {} documents, {} custodians, {} doctypes",
                style("index").bold(),
                cache.doc_count,
                cache.custodians.len(),
                cache.doctypes.len()
            );
            if !cache.custodians.is_empty() {
                println!(
                    "  custodians: {}",
                    cache
                        .custodians
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        Err(_) => println!("{} not built", style("index").bold()),
    }

    let dense_built = settings
        .dense_dir()
        .read_dir()
        .map(|mut entries| entries.any(|e| {
            e.map(|e| e.path().extension().map(|x| x == "graph") == Some(true))
                .unwrap_or(false)
        }))
        .unwrap_or(false);
    println!(
        "{} {}",
        style("dense").bold(),
        if dense_built { "built" } else { "not built" }
    );

    match Ledger::read_all(&settings.audit_path) {
        Ok(entries) if !entries.is_empty() => {
            println!(
                "{} {} entries (last: {})",
                style("audit").bold(),
                entries.len(),
                entries.last().map(|e| e.operation.as_str()).unwrap_or("-")
            );
        }
        _ => println!("{} empty", style("audit").bold()),
    }

    println!(
        "{} {}",
        style("online").bold(),
        if settings.online { "enabled" } else { "disabled (offline-first)" }
    );
    Ok(())
}
