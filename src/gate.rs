//! Offline gate.
//!
//! A capability handle that every network-using code path must consult
//! before opening a socket. Constructed once from settings and passed
//! down explicitly; tests build fresh instances per scenario.

use crate::error::{Result, RexError};

/// Process-wide network opt-in, passed as a handle rather than a global.
#[derive(Debug, Clone)]
pub struct OfflineGate {
    online: bool,
}

impl OfflineGate {
    /// Create a gate. `online` comes from resolved settings.
    pub fn new(online: bool) -> Self {
        Self { online }
    }

    /// Whether online mode is enabled.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Demand network access for a named purpose.
    ///
    /// Callers invoke this before any socket is opened. The purpose string
    /// names the capability ("dense embeddings", "privilege classifier")
    /// and is surfaced verbatim in the refusal message.
    pub fn require(&self, purpose: &str) -> Result<()> {
        if self.online {
            tracing::debug!("offline gate cleared for '{}'", purpose);
            Ok(())
        } else {
            Err(RexError::NetworkRefused {
                purpose: purpose.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_refuses_by_default() {
        let gate = OfflineGate::new(false);
        let err = gate.require("dense embeddings").unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("dense embeddings"));
    }

    #[test]
    fn test_gate_clears_when_online() {
        let gate = OfflineGate::new(true);
        assert!(gate.require("dense embeddings").is_ok());
    }
}
