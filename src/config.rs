//! Configuration management.
//!
//! Settings resolve in the order: CLI arguments, environment variables,
//! config file, built-in defaults. The data home is a single directory the
//! engine exclusively owns; every artifact path hangs off it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RexError};

/// Default Matryoshka embedding dimension.
pub const DEFAULT_DENSE_DIM: usize = 768;

/// Accepted Matryoshka dimensions.
pub const DENSE_DIMS: [usize; 5] = [256, 512, 768, 1024, 1792];

/// Default document batch size for the index build pipeline.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default commit cadence (documents per index commit).
pub const DEFAULT_COMMIT_EVERY: usize = 1000;

/// Default per-request embedding timeout in seconds.
pub const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Data home; all artifacts live underneath.
    pub home: PathBuf,
    /// Worker pool size for parallel index builds.
    pub workers: usize,
    /// Documents per build batch.
    pub batch_size: usize,
    /// Documents per index commit.
    pub commit_every: usize,
    /// Network opt-in for the offline gate.
    pub online: bool,
    /// Embedding dimension for the dense index.
    pub dense_dim: usize,
    /// Embedding provider credentials.
    pub embedding_api_key: Option<String>,
    /// Embedding provider base URL (OpenAI-style /embeddings endpoint).
    pub embedding_api_base: Option<String>,
    /// Audit ledger path.
    pub audit_path: PathBuf,
    /// Log level override.
    pub log_level: Option<String>,
    /// Include dotfiles and hidden directories during discovery.
    pub include_hidden: bool,
    /// Per-request embedding timeout in seconds.
    pub embed_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/rexlit; falls back to the current directory.
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rexlit");
        Self {
            audit_path: home.join("audit").join("log.jsonl"),
            home,
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            commit_every: DEFAULT_COMMIT_EVERY,
            online: false,
            dense_dim: DEFAULT_DENSE_DIM,
            embedding_api_key: None,
            embedding_api_base: None,
            log_level: None,
            include_hidden: false,
            embed_timeout_secs: DEFAULT_EMBED_TIMEOUT_SECS,
        }
    }
}

/// `max(1, cores - 1)`, leaving one core for the writer.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

impl Settings {
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            audit_path: home.join("audit").join("log.jsonl"),
            home,
            ..Default::default()
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.home.join("manifest.jsonl")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.home.join("index")
    }

    pub fn lexical_dir(&self) -> PathBuf {
        self.index_dir().join("lexical")
    }

    pub fn metadata_cache_path(&self) -> PathBuf {
        self.index_dir().join("metadata_cache.json")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.index_dir().join("dense")
    }

    pub fn bates_dir(&self) -> PathBuf {
        self.home.join("bates")
    }

    pub fn redactions_dir(&self) -> PathBuf {
        self.home.join("redactions")
    }

    pub fn redaction_plans_dir(&self) -> PathBuf {
        self.redactions_dir().join("plans")
    }

    pub fn redactions_out_dir(&self) -> PathBuf {
        self.redactions_dir().join("out")
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.home.join("rules")
    }

    /// Create every directory the engine writes into.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.home.clone(),
            self.audit_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.home.join("audit")),
            self.lexical_dir(),
            self.dense_dir(),
            self.bates_dir(),
            self.redaction_plans_dir(),
            self.redactions_out_dir(),
            self.rules_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }

    /// Validate knobs that have a closed domain.
    pub fn validate(&self) -> Result<()> {
        if !DENSE_DIMS.contains(&self.dense_dim) {
            return Err(RexError::ConfigError(format!(
                "dense_dim must be one of {:?}, got {}",
                DENSE_DIMS, self.dense_dim
            )));
        }
        if self.workers == 0 {
            return Err(RexError::ConfigError("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(RexError::ConfigError("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Configuration file structure. All fields optional; absent fields fall
/// through to environment variables and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "home")]
    pub root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_every: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_hidden: Option<bool>,
    /// Path this config was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// Format is chosen by extension: TOML, YAML, or JSON (default).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RexError::ConfigError(format!("failed to read config '{}': {}", path.display(), e))
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| RexError::ConfigError(format!("invalid TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| RexError::ConfigError(format!("invalid YAML config: {}", e)))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| RexError::ConfigError(format!("invalid JSON config: {}", e)))?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Discover a config file next to the data home: `rexlit.{toml,yaml,yml,json}`.
    pub fn discover(home: &Path) -> Option<PathBuf> {
        for ext in ["toml", "yaml", "yml", "json"] {
            let candidate = home.join(format!("rexlit.{}", ext));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Resolve a possibly-relative, possibly-tilded path against `base_dir`.
    fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file-level configuration onto settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref root) = self.root_dir {
            settings.home = Self::resolve_path(root, base_dir);
            settings.audit_path = settings.home.join("audit").join("log.jsonl");
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(batch) = self.batch_size {
            settings.batch_size = batch;
        }
        if let Some(every) = self.commit_every {
            settings.commit_every = every;
        }
        if let Some(online) = self.online {
            settings.online = online;
        }
        if let Some(dim) = self.dense_dim {
            settings.dense_dim = dim;
        }
        if let Some(ref key) = self.embedding_api_key {
            settings.embedding_api_key = Some(key.clone());
        }
        if let Some(ref base) = self.embedding_api_base {
            settings.embedding_api_base = Some(base.clone());
        }
        if let Some(ref audit) = self.audit_path {
            settings.audit_path = Self::resolve_path(audit, base_dir);
        }
        if let Some(ref level) = self.log_level {
            settings.log_level = Some(level.clone());
        }
        if let Some(hidden) = self.include_hidden {
            settings.include_hidden = hidden;
        }
    }
}

/// Options resolved from CLI flags; these take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data home (`--home` flag).
    pub home: Option<PathBuf>,
    /// Online override (`--online` flag).
    pub online: Option<bool>,
    /// Dense dimension override (`--dim` flag).
    pub dense_dim: Option<usize>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            RexError::ConfigError(format!("environment variable {} is not valid: {}", name, raw))
        }),
    }
}

fn env_bool(name: &str) -> Option<bool> {
    env_var(name).map(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// Resolve settings: defaults, then config file, then environment, then CLI.
pub fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config)> {
    let mut settings = Settings::default();

    // Config file: explicit path, else discovery next to the home the CLI
    // or environment points at, else next to the default home.
    let probe_home = options
        .home
        .clone()
        .or_else(|| env_var("REXLIT_HOME").map(PathBuf::from))
        .unwrap_or_else(|| settings.home.clone());
    let config = if let Some(ref path) = options.config_path {
        Config::load_from_path(path)?
    } else if let Some(found) = Config::discover(&probe_home) {
        tracing::debug!("found config next to data home: {}", found.display());
        Config::load_from_path(&found)?
    } else {
        Config::default()
    };

    let base_dir = config
        .source_path
        .as_ref()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // Environment overrides.
    if let Some(home) = env_var("REXLIT_HOME") {
        settings.home = PathBuf::from(shellexpand::tilde(&home).into_owned());
        settings.audit_path = settings.home.join("audit").join("log.jsonl");
    }
    if let Some(workers) = env_parse::<usize>("REXLIT_WORKERS")? {
        settings.workers = workers;
    }
    if let Some(batch) = env_parse::<usize>("REXLIT_BATCH_SIZE")? {
        settings.batch_size = batch;
    }
    if let Some(every) = env_parse::<usize>("REXLIT_COMMIT_EVERY")? {
        settings.commit_every = every;
    }
    if let Some(audit) = env_var("REXLIT_AUDIT_LOG") {
        settings.audit_path = PathBuf::from(shellexpand::tilde(&audit).into_owned());
    }
    if let Some(online) = env_bool("REXLIT_ONLINE") {
        settings.online = online;
    }
    if let Some(level) = env_var("REXLIT_LOG_LEVEL") {
        settings.log_level = Some(level);
    }
    if let Some(dim) = env_parse::<usize>("REXLIT_DENSE_DIM")? {
        settings.dense_dim = dim;
    }
    if let Some(key) = env_var("REXLIT_EMBED_API_KEY") {
        settings.embedding_api_key = Some(key);
    }
    if let Some(base) = env_var("REXLIT_EMBED_API_BASE") {
        settings.embedding_api_base = Some(base);
    }

    // CLI overrides win.
    if let Some(home) = options.home {
        settings.home = home;
        settings.audit_path = settings.home.join("audit").join("log.jsonl");
    }
    if let Some(online) = options.online {
        settings.online = online;
    }
    if let Some(dim) = options.dense_dim {
        settings.dense_dim = dim;
    }

    settings.validate()?;
    Ok((settings, config))
}
