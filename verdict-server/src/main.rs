//! verdict-server — HTTP API for Verdict evaluation runs.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verdict_core::config::{InvokerMode, load_config};
use verdict_core::invoker::{HttpInvoker, StubInvoker, TargetInvoker};
use verdict_core::judge::LlmJudge;
use verdict_core::store::EvalStore;

use verdict_server::auth::ApiKeyAuth;
use verdict_server::routes::{AppState, api_router};

/// Verdict evaluation API server
#[derive(Parser, Debug)]
#[command(name = "verdict-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the configured one
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let bind_addr = cli.bind.unwrap_or_else(|| config.server.bind_addr.clone());

    let store = Arc::new(
        EvalStore::open(&config.storage.db_path).context("Failed to open eval store")?,
    );

    // A missing judge credential must fail startup, not the first run.
    let judge = Arc::new(LlmJudge::new(&config.judge).context("Failed to construct judge")?);

    let invoker: Arc<dyn TargetInvoker> = match config.invoker.mode {
        InvokerMode::Stub => Arc::new(StubInvoker),
        InvokerMode::Http => Arc::new(
            HttpInvoker::new(&config.invoker).context("Failed to construct target invoker")?,
        ),
    };

    let auth = ApiKeyAuth::new(config.server.api_key.clone());
    if auth.is_open_mode() {
        info!("No API key configured; running in open mode");
    }

    let state = AppState {
        store,
        invoker,
        judge,
        auth,
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, db = %config.storage.db_path.display(), "Verdict server listening");

    axum::serve(listener, api_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
