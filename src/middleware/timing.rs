use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{MetricsContext, RequestSample};

/// Outermost instrumentation layer.
///
/// Times the whole downstream chain (including any injected delay), fires
/// the metrics finish hooks once the response is produced, and adds two
/// response headers:
///
///   X-Response-Time-Us  — total handler wall time in microseconds
///   Server-Timing       — same value in the standard Server-Timing format
pub async fn timing_middleware(
    State(metrics): State<Arc<MetricsContext>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();
    let status = response.status().as_u16();

    metrics.record(&RequestSample::new(method.as_str(), path.as_str(), status, elapsed));

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // Skip noisy SSE requests
    if !path.ends_with("/stream") {
        tracing::debug!(%method, %path, status, us = us as u64, "request finished");
    }

    response
}
