//! Domain error taxonomy.
//!
//! Every failure that crosses a module boundary is one of these kinds.
//! CLI consumers map kinds to exit codes via [`RexError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum RexError {
    /// A path resolved outside the declared root after symlink resolution.
    #[error("path escapes declared root: {path} resolves outside {root}")]
    BoundaryViolation { root: PathBuf, path: PathBuf },

    /// Per-document extraction failure. The pipeline records a placeholder
    /// document and continues; this kind only aborts when extraction was
    /// requested for a single explicit target.
    #[error("extraction failed for {path}: {reason}")]
    ExtractionFailure { path: PathBuf, reason: String },

    /// The ledger file could not be parsed as a chain of entries.
    #[error("audit ledger corrupted: {0}")]
    LedgerCorrupted(String),

    /// Hash chain verification failed at the given entry index.
    #[error("audit chain broken at entry {index}")]
    ChainBroken { index: usize },

    /// The offline gate refused a network-using capability.
    #[error(
        "network use refused for '{purpose}': enable online mode \
         (config `online = true`, REXLIT_ONLINE=1, or --online)"
    )]
    NetworkRefused { purpose: String },

    /// A plan input's bytes changed between plan and apply.
    #[error(
        "input hash mismatch for {path}: expected {expected}, actual {actual}; \
         regenerate the plan against the current inputs"
    )]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A planned Bates range overlaps ranges already in the registry.
    #[error("Bates collision in prefix '{prefix}': {conflicts} overlapping range(s)")]
    BatesCollision { prefix: String, conflicts: usize },

    /// An embedding request exceeded its per-request budget.
    #[error("embedding request timed out after {seconds}s")]
    TimeoutExceeded { seconds: u64 },

    /// Startup configuration is invalid or incomplete.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RexError {
    /// Short machine-readable kind name for structured error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BoundaryViolation { .. } => "BoundaryViolation",
            Self::ExtractionFailure { .. } => "ExtractionFailure",
            Self::LedgerCorrupted(_) => "LedgerCorrupted",
            Self::ChainBroken { .. } => "ChainBroken",
            Self::NetworkRefused { .. } => "NetworkRefused",
            Self::HashMismatch { .. } => "HashMismatch",
            Self::BatesCollision { .. } => "BatesCollision",
            Self::TimeoutExceeded { .. } => "TimeoutExceeded",
            Self::ConfigError(_) => "ConfigError",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    /// Process exit code for CLI consumers.
    ///
    /// 0 success, 1 generic, 2 boundary/security, 3 ledger integrity,
    /// 4 collision/drift, 5 offline gate refusal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BoundaryViolation { .. } => 2,
            Self::LedgerCorrupted(_) | Self::ChainBroken { .. } => 3,
            Self::BatesCollision { .. } | Self::HashMismatch { .. } => 4,
            Self::NetworkRefused { .. } => 5,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, RexError>;
