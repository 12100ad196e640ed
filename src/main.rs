use std::sync::Arc;

use slo_sample_app::{config, error::Result, server, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slo_sample_app=info,tower_http=info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(%err, "sample app exited");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // ── 1. Load config ───────────────────────────────────────────
    let cfg = config::load_from_env()?;
    let listen = cfg.server.listen_addr()?;

    // ── 2. Build metrics + shared state ──────────────────────────
    let state = Arc::new(AppState::from_config(cfg)?);
    tracing::info!(
        latency_threshold_seconds = state.config.slo.latency_threshold_seconds,
        delay_probability = state.config.delay.probability,
        "metrics registered"
    );

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(%listen, "listening, metrics at /metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
