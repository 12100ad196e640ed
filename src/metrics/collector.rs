use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::slo::{RequestClassifier, RouteClassifier, SloStatus, SloTracker};
use super::summary::{SummaryRecorder, SummaryVec};
use super::{FinishHook, RequestSample};
use crate::config::AppConfig;
use crate::error::{AppError, Result};

// ─── Metric names ────────────────────────────────────────────────

pub const SUMMARY_METRIC: &str = "sample_app_summary_request_duration_seconds";
pub const HISTOGRAM_METRIC: &str = "sample_app_histogram_request_duration_seconds";

// ─── Public types ────────────────────────────────────────────────

/// Owns the registry and every instrument fed by finished requests.
/// Built once at startup and shared by `Arc`; tests build their own.
pub struct MetricsContext {
    registry: Registry,
    summary: SummaryVec,
    histogram: HistogramVec,
    slo: Arc<SloTracker>,
    hooks: Vec<Arc<dyn FinishHook>>,
}

/// One `(method, status)` latency series in the JSON snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySeries {
    pub method: String,
    pub status: String,
    #[serde(flatten)]
    pub stats: PercentileSet,
}

/// Read-only view shipped by `/api/metrics` and the SSE stream.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub total_requests: u64,
    pub latency: Vec<LatencySeries>,
    pub slo: Vec<SloStatus>,
}

/// Histogram half of the timing recorder.
struct HistogramRecorder(HistogramVec);

impl FinishHook for HistogramRecorder {
    fn on_request_finish(&self, sample: &RequestSample) {
        if let Some((status, secs)) = sample.checked() {
            let status = status.to_string();
            self.0
                .with_label_values(&[sample.method.as_str(), status.as_str()])
                .observe(secs);
        }
    }
}

// ─── MetricsContext impl ─────────────────────────────────────────

impl MetricsContext {
    pub fn new(cfg: &AppConfig, classifier: Arc<dyn RequestClassifier>) -> Result<Self> {
        let registry = Registry::new();

        let summary = SummaryVec::new(
            SUMMARY_METRIC,
            "Summary of request durations",
            cfg.metrics.percentiles.clone(),
            cfg.metrics.summary_max_age_secs.map(Duration::from_secs),
        )?;
        registry.register(Box::new(summary.clone()))?;

        let histogram = HistogramVec::new(
            HistogramOpts::new(HISTOGRAM_METRIC, "Histogram of request durations")
                .buckets(cfg.metrics.buckets.clone()),
            &["method", "status"],
        )?;
        registry.register(Box::new(histogram.clone()))?;

        let slo = Arc::new(SloTracker::register(
            &registry,
            cfg.slo.latency_threshold_seconds,
            classifier,
        )?);

        if cfg.metrics.process_metrics {
            register_process_metrics(&registry)?;
        }

        // Registration order is firing order.
        let hooks: Vec<Arc<dyn FinishHook>> = vec![
            Arc::new(SummaryRecorder(summary.clone())),
            Arc::new(HistogramRecorder(histogram.clone())),
            slo.clone(),
        ];

        Ok(Self {
            registry,
            summary,
            histogram,
            slo,
            hooks,
        })
    }

    /// Context with the classifier described by `cfg.slo`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(cfg, Arc::new(RouteClassifier::from_config(&cfg.slo)))
    }

    /// Fire every finish hook for one request. Called from the timing middleware.
    pub fn record(&self, sample: &RequestSample) {
        for hook in &self.hooks {
            hook.on_request_finish(sample);
        }
    }

    pub fn slo(&self) -> &SloTracker {
        &self.slo
    }

    pub fn histogram(&self) -> &HistogramVec {
        &self.histogram
    }

    pub fn summary(&self) -> &SummaryVec {
        &self.summary
    }

    /// Prometheus text exposition of everything in the registry.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| AppError::Internal(format!("non-utf8 exposition: {e}")))
    }

    /// Produce a read-only snapshot for the JSON endpoints.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency: Vec<LatencySeries> = self
            .summary
            .snapshot()
            .into_iter()
            .map(|((method, status), stats)| LatencySeries {
                method,
                status,
                stats,
            })
            .collect();

        MetricsSnapshot {
            captured_at: Utc::now(),
            total_requests: latency.iter().map(|s| s.stats.count).sum(),
            latency,
            slo: self.slo.statuses(),
        }
    }
}

#[cfg(target_os = "linux")]
fn register_process_metrics(registry: &Registry) -> Result<()> {
    use prometheus::process_collector::ProcessCollector;

    registry.register(Box::new(ProcessCollector::for_self()))?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn register_process_metrics(_registry: &Registry) -> Result<()> {
    tracing::debug!("process metrics are only collected on linux");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::slo::{RequestClass, SloId};
    use parking_lot::Mutex;
    use prometheus::core::Metric;

    fn context() -> MetricsContext {
        let mut cfg = AppConfig::default();
        cfg.metrics.process_metrics = false;
        MetricsContext::from_config(&cfg).unwrap()
    }

    fn sample(status: u16, millis: u64) -> RequestSample {
        RequestSample::new("GET", "/", status, Duration::from_millis(millis))
    }

    #[test]
    fn record_feeds_summary_histogram_and_slo() {
        let ctx = context();
        ctx.record(&sample(503, 200));

        let h = ctx.histogram().with_label_values(&["GET", "503"]);
        assert_eq!(h.get_sample_count(), 1);
        assert!((h.get_sample_sum() - 0.2).abs() < 1e-9);

        let set = ctx.summary().percentiles("GET", "503").unwrap();
        assert_eq!(set.count, 1);

        let slo = ctx.slo();
        assert_eq!(slo.errors(SloId::LatencyP99Under100ms, RequestClass::Critical), 1);
        assert_eq!(slo.errors(SloId::AvailabilityP99Success, RequestClass::Critical), 1);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let ctx = context();
        for ms in [1, 7, 20, 40, 90, 300, 700, 1_500, 4_000, 9_000, 20_000] {
            ctx.record(&sample(200, ms));
        }

        let metric = ctx.histogram().with_label_values(&["GET", "200"]).metric();
        let buckets = metric.get_histogram().get_bucket();
        let bounds: Vec<f64> = buckets.iter().map(|b| b.get_upper_bound()).collect();
        assert_eq!(
            bounds,
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        );

        let counts: Vec<u64> = buckets.iter().map(|b| b.get_cumulative_count()).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 5, 6, 7, 8, 9, 10]);
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(metric.get_histogram().get_sample_count(), 11);
    }

    #[test]
    fn incomplete_samples_touch_nothing() {
        let ctx = context();
        let mut s = sample(500, 500);
        s.duration_secs = None;
        ctx.record(&s);

        assert!(ctx.summary().percentiles("GET", "500").is_none());
        assert_eq!(ctx.snapshot().total_requests, 0);
        for row in ctx.slo().statuses() {
            assert_eq!((row.requests, row.errors), (0, 0));
        }
    }

    #[test]
    fn render_reports_zeroed_slo_counters_before_traffic() {
        let text = context().render().unwrap();
        assert!(text.contains(
            "sample_app_slo_requests_total{class=\"NO_SLO\",slo=\"availability_p99_success\"} 0"
        ));
        assert!(text.contains(
            "sample_app_slo_errors_total{class=\"HIGH_FAST\",slo=\"latency_p99_under_100ms\"} 0"
        ));
    }

    #[test]
    fn render_includes_latency_families() {
        let ctx = context();
        ctx.record(&sample(200, 10));
        let text = ctx.render().unwrap();
        assert!(text.contains("# TYPE sample_app_summary_request_duration_seconds summary"));
        assert!(text.contains("# TYPE sample_app_histogram_request_duration_seconds histogram"));
        assert!(text.contains(
            "sample_app_histogram_request_duration_seconds_bucket{method=\"GET\",status=\"200\",le=\"0.01\"} 1"
        ));
    }

    #[test]
    fn snapshot_counts_requests() {
        let ctx = context();
        ctx.record(&sample(200, 5));
        ctx.record(&sample(200, 5));
        ctx.record(&sample(500, 5));
        let snap = ctx.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.latency.len(), 2);
        assert_eq!(snap.slo.len(), 10);
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl FinishHook for Tag {
            fn on_request_finish(&self, _: &RequestSample) {
                self.1.lock().push(self.0);
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = context();
        ctx.hooks = vec![
            Arc::new(Tag("summary", seen.clone())),
            Arc::new(Tag("histogram", seen.clone())),
            Arc::new(Tag("slo", seen.clone())),
        ];
        ctx.record(&sample(200, 1));
        assert_eq!(*seen.lock(), vec!["summary", "histogram", "slo"]);
    }
}
