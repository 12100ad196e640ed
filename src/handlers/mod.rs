pub mod load;

use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ─── GET / ───────────────────────────────────────────────────────
/// Main route. A sampled fraction of requests sleeps first so the latency
/// metrics and the latency SLO have something to show.

pub async fn hello(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let delay = &state.config.delay;
    let delayed = rand::thread_rng().gen_bool(delay.probability);
    if delayed {
        tokio::time::sleep(Duration::from_millis(delay.duration_ms)).await;
    }

    ([(header::CONTENT_TYPE, TEXT_PLAIN)], "Hello, world!")
}

// ─── GET /fail ───────────────────────────────────────────────────
/// Always answers 503; drives the availability SLO.

pub async fn fail() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        "Simulated failure",
    )
}
