//! Orchestrator server binary.
//!
//! ```bash
//! orchestrator --config ./orchestrator.toml
//! ```
//!
//! Settings come from the config file and the environment; see
//! [`member_offer_orchestrator::config`].

use anyhow::Context;
use clap::Parser;
use member_offer_orchestrator::bootstrap::build_app;
use member_offer_orchestrator::config::Settings;
use member_offer_orchestrator::telemetry::init_tracing;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "orchestrator", about = "Member offer orchestrator")]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(long, short, env = "ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&settings.log).context("installing tracing subscriber")?;

    let app = build_app(&settings).context("building application")?;
    let addr = settings.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!(
        address = %addr,
        member_history = %settings.upstreams.member_history.base_url,
        prediction = %settings.upstreams.prediction.base_url,
        offer_engine = %settings.upstreams.offer_engine.base_url,
        max_retries = settings.http.max_retries,
        timeout_ms = settings.http.timeout_ms,
        "Orchestrator listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Orchestrator shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
