//! CLI parser and dispatch.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bates::Anchor;
use crate::config::{load_settings_with_options, LoadOptions};
use crate::rules::ServiceMethod;

#[derive(Parser)]
#[command(name = "rexlit")]
#[command(about = "Offline-first e-discovery engine")]
#[command(version)]
pub struct Cli {
    /// Data home directory (overrides config and REXLIT_HOME).
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data home and write default rule packs.
    Init,

    /// Ingest a document tree into the manifest.
    Ingest {
        /// Root directory to ingest.
        root: PathBuf,
        /// Include dotfiles and hidden directories.
        #[arg(long)]
        hidden: bool,
    },

    /// Build or query the search index.
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Inspect or verify the audit ledger.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Bates numbering: plan, then apply.
    Bates {
        #[command(subcommand)]
        command: BatesCommands,
    },

    /// Redaction: plan, then apply.
    Redact {
        #[command(subcommand)]
        command: RedactCommands,
    },

    /// Jurisdictional deadline rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },

    /// Show system status.
    Status,
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Build the lexical index (and optionally the dense index).
    Build {
        /// Also build the dense vector index.
        #[arg(long)]
        dense: bool,
        /// Embedding dimension.
        #[arg(long)]
        dim: Option<usize>,
        /// Allow network use for the embedding provider.
        #[arg(long)]
        online: bool,
    },
    /// Search the index; prints a JSON hit list.
    Search {
        query: String,
        /// Retrieval mode.
        #[arg(long, default_value = "lexical")]
        mode: SearchMode,
        /// Maximum hits.
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter by custodian.
        #[arg(long)]
        custodian: Option<String>,
        /// Filter by doctype.
        #[arg(long)]
        doctype: Option<String>,
        /// Filter by privilege tag (true/false).
        #[arg(long)]
        privileged: Option<bool>,
        /// Filter by responsiveness tag (true/false).
        #[arg(long)]
        responsive: Option<bool>,
        /// Filter by production tag (true/false).
        #[arg(long)]
        production: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    Lexical,
    Dense,
    Hybrid,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Print ledger entries.
    Show {
        /// Show only the last N entries.
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Verify hash integrity and chain contiguity.
    Verify,
}

#[derive(Subcommand)]
enum BatesCommands {
    /// Allocate ranges over the manifest; writes a plan.
    Plan {
        /// Prefix namespace.
        #[arg(long, default_value = "REX")]
        prefix: String,
        /// First number to assign.
        #[arg(long, default_value = "1")]
        start: u64,
        /// Zero-pad width.
        #[arg(long, default_value = "7")]
        width: usize,
        /// Print the first N labels without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Stamp documents per the stored plan and append the registry.
    Apply {
        #[arg(long, default_value = "REX")]
        prefix: String,
        /// Stamp anchor position.
        #[arg(long, default_value = "bottom-right")]
        anchor: Anchor,
        /// Draw a white backing rectangle under the label.
        #[arg(long)]
        backing: bool,
        /// Proceed despite registry collisions (audited).
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RedactCommands {
    /// Scan for PII and write a redaction plan.
    Plan,
    /// Apply a redaction plan.
    Apply {
        /// Plan file (defaults to the most recent plan).
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Proceed despite input drift (audited).
        #[arg(long)]
        force: bool,
        /// Render side-by-side comparisons without producing final
        /// artifacts or touching originals.
        #[arg(long)]
        preview: bool,
    },
}

#[derive(Subcommand)]
enum RulesCommands {
    /// Compute deadlines for an event.
    Calc {
        /// TX or FL.
        #[arg(long)]
        jurisdiction: String,
        /// Triggering event name.
        #[arg(long)]
        event: String,
        /// Base date, YYYY-MM-DD.
        #[arg(long)]
        date: chrono::NaiveDate,
        /// Service method.
        #[arg(long, default_value = "personal")]
        service: ServiceMethod,
        /// Include a one-line arithmetic trace per deadline.
        #[arg(long)]
        explain: bool,
        /// Also write an iCalendar file.
        #[arg(long)]
        ics: Option<PathBuf>,
    },
    /// List events and deadlines in a jurisdiction's pack.
    List {
        #[arg(long)]
        jurisdiction: String,
    },
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.config.clone(),
        home: cli.home.clone(),
        online: None,
        dense_dim: None,
    };

    match cli.command {
        Commands::Init => {
            let (settings, _) = load_settings_with_options(options)?;
            commands::init::cmd_init(&settings).await
        }
        Commands::Ingest { root, hidden } => {
            let (mut settings, _) = load_settings_with_options(options)?;
            if hidden {
                settings.include_hidden = true;
            }
            commands::ingest::cmd_ingest(&settings, &root).await
        }
        Commands::Index { command } => match command {
            IndexCommands::Build { dense, dim, online } => {
                let (settings, _) = load_settings_with_options(LoadOptions {
                    online: online.then_some(true),
                    dense_dim: dim,
                    ..options
                })?;
                commands::index_cmd::cmd_build(&settings, dense).await
            }
            IndexCommands::Search {
                query,
                mode,
                limit,
                custodian,
                doctype,
                privileged,
                responsive,
                production,
            } => {
                let (settings, _) = load_settings_with_options(options)?;
                let filters = crate::index::SearchFilters {
                    custodian,
                    doctype,
                    privileged,
                    responsive,
                    production,
                };
                commands::index_cmd::cmd_search(&settings, &query, mode, limit, filters).await
            }
        },
        Commands::Audit { command } => {
            let (settings, _) = load_settings_with_options(options)?;
            match command {
                AuditCommands::Show { tail } => commands::audit_cmd::cmd_show(&settings, tail),
                AuditCommands::Verify => commands::audit_cmd::cmd_verify(&settings),
            }
        }
        Commands::Bates { command } => {
            let (settings, _) = load_settings_with_options(options)?;
            match command {
                BatesCommands::Plan {
                    prefix,
                    start,
                    width,
                    dry_run,
                } => commands::bates_cmd::cmd_plan(&settings, prefix, start, width, dry_run),
                BatesCommands::Apply {
                    prefix,
                    anchor,
                    backing,
                    force,
                } => commands::bates_cmd::cmd_apply(&settings, prefix, anchor, backing, force),
            }
        }
        Commands::Redact { command } => {
            let (settings, _) = load_settings_with_options(options)?;
            match command {
                RedactCommands::Plan => commands::redact_cmd::cmd_plan(&settings),
                RedactCommands::Apply {
                    plan,
                    force,
                    preview,
                } => commands::redact_cmd::cmd_apply(&settings, plan, force, preview),
            }
        }
        Commands::Rules { command } => {
            let (settings, _) = load_settings_with_options(options)?;
            match command {
                RulesCommands::Calc {
                    jurisdiction,
                    event,
                    date,
                    service,
                    explain,
                    ics,
                } => commands::rules_cmd::cmd_calc(
                    &settings,
                    &jurisdiction,
                    &event,
                    date,
                    service,
                    explain,
                    ics,
                ),
                RulesCommands::List { jurisdiction } => {
                    commands::rules_cmd::cmd_list(&settings, &jurisdiction)
                }
            }
        }
        Commands::Status => {
            let (settings, _) = load_settings_with_options(options)?;
            commands::status::cmd_status(&settings)
        }
    }
}

/// Map an error chain to the documented process exit code.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    use crate::error::RexError;
    use crate::index::dense::DenseError;
    use crate::index::IndexError;

    for cause in error.chain() {
        if let Some(rex) = cause.downcast_ref::<RexError>() {
            return rex.exit_code();
        }
        if let Some(IndexError::Dense(DenseError::Refused(rex))) =
            cause.downcast_ref::<IndexError>()
        {
            return rex.exit_code();
        }
        if let Some(DenseError::Refused(rex)) = cause.downcast_ref::<DenseError>() {
            return rex.exit_code();
        }
    }
    1
}

/// Short kind name for structured error output.
pub fn kind_for(error: &anyhow::Error) -> &'static str {
    use crate::error::RexError;
    for cause in error.chain() {
        if let Some(rex) = cause.downcast_ref::<RexError>() {
            return rex.kind();
        }
    }
    "Error"
}
