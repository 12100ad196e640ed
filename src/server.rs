use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
///
/// The timing middleware wraps every route, `/metrics` included, so the
/// scrape itself shows up in the latency series.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Sample routes ───────────────────────────────────────
        .route("/", get(handlers::hello))
        .route("/fail", get(handlers::fail))
        // ── Load generator control ──────────────────────────────
        .route("/api/load/start", post(handlers::load::start_load))
        .route("/api/load/stop", post(handlers::load::stop_load))
        .route("/api/load/status", get(handlers::load::load_status))
        // ── Metrics ─────────────────────────────────────────────
        .route("/metrics", get(stream::scrape))
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state.clone())
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            state.metrics.clone(),
            timing::timing_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
