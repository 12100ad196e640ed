use axum::{
    extract::State,
    http::header,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::MetricsSnapshot;
use crate::error::Result;
use crate::AppState;

/// SSE event name carrying a [`MetricsSnapshot`].
pub const SNAPSHOT_EVENT: &str = "snapshot";

// ─── GET /metrics ────────────────────────────────────────────────
/// Prometheus scrape endpoint.

pub async fn scrape(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot — useful for curl / debugging.

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Live SLO feed for `curl -N` or an `EventSource`: a `snapshot` event
/// every `metrics.stream_interval_ms`, the first one immediately.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<Event, Infallible>>> {
    let period = Duration::from_millis(state.config.metrics.stream_interval_ms);
    let interval = tokio::time::interval(period);

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.metrics.snapshot();
        let event = Event::default()
            .event(SNAPSHOT_EVENT)
            .json_data(&snapshot)
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "could not encode metrics snapshot");
                Event::default().comment("snapshot unavailable")
            });
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::server::create_router;
    use crate::AppState;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn stream_emits_snapshot_event_with_every_slo_row() {
        let mut cfg = AppConfig::default();
        cfg.metrics.process_metrics = false;
        cfg.delay.probability = 0.0;
        let state = Arc::new(AppState::from_config(cfg).unwrap());
        let app = create_router(state);

        let fail = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        app.clone().oneshot(fail).await.unwrap();

        let req = Request::builder()
            .uri("/api/metrics/stream")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let mut body = resp.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let frame = String::from_utf8(chunk.to_vec()).unwrap();

        assert!(frame.lines().any(|l| l == "event: snapshot"), "{frame}");
        let data = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(data).unwrap();

        let rows = json["slo"].as_array().unwrap();
        assert_eq!(rows.len(), 10);
        let critical_availability = rows
            .iter()
            .find(|r| r["slo"] == "availability_p99_success" && r["class"] == "CRITICAL")
            .unwrap();
        assert_eq!(critical_availability["requests"], 1);
        assert_eq!(critical_availability["errors"], 1);
    }
}
