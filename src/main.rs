//! RexLit - offline-first e-discovery toolkit.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rexlit::cli;

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "rexlit=info"
    } else {
        "rexlit=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("REXLIT_LOG_LEVEL")
                .map(|level| tracing_subscriber::EnvFilter::new(format!("rexlit={}", level)))
        })
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = cli::run().await {
        let kind = cli::kind_for(&error);
        let code = cli::exit_code_for(&error);
        eprintln!(
            "{}",
            serde_json::json!({
                "kind": kind,
                "message": error.to_string(),
            })
        );
        std::process::exit(code);
    }
}
