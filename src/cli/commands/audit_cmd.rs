//! Audit show / verify commands.

use console::style;

use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::error::RexError;

pub fn cmd_show(settings: &Settings, tail: Option<usize>) -> anyhow::Result<()> {
    let entries = Ledger::read_all(&settings.audit_path)?;
    let total = entries.len();
    let skip = tail.map(|n| total.saturating_sub(n)).unwrap_or(0);
    for (i, entry) in entries.iter().enumerate().skip(skip) {
        println!(
            "{:>6}  {}  {:<24} inputs={} outputs={}  {}",
            i,
            entry.timestamp,
            entry.operation.as_str(),
            entry.inputs.len(),
            entry.outputs.len(),
            style(&entry.entry_hash[..12]).dim(),
        );
    }
    println!("{} entries", total);
    Ok(())
}

pub fn cmd_verify(settings: &Settings) -> anyhow::Result<()> {
    let (ok, first_bad) = Ledger::verify(&settings.audit_path)?;
    if ok {
        let entries = Ledger::read_all(&settings.audit_path)?;
        println!(
            "{} Chain verified: {} entries",
            style("✓").green(),
            entries.len()
        );
        // The verification itself joins the record when a writer is free.
        if let Ok(ledger) = Ledger::open(&settings.audit_path) {
            let _ = ledger.log(
                Operation::AuditVerify,
                vec![settings.audit_path.to_string_lossy().into_owned()],
                vec![],
                serde_json::json!({"entries": entries.len(), "ok": true}),
            );
        }
        Ok(())
    } else {
        let index = first_bad.unwrap_or(0);
        println!(
            "{} Chain broken at entry {}",
            style("✗").red(),
            index
        );
        Err(RexError::ChainBroken { index }.into())
    }
}
