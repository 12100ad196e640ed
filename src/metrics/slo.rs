//! SLO counters: request classification and per-request threshold checks.
//!
//! Every finished request is tracked under both SLOs for its class. A request
//! counts as a latency violation when its own duration exceeds the threshold
//! (no percentile is computed here despite the SLO name) and as an
//! availability violation when it answered with a 5xx status.

use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry};
use serde::{Deserialize, Serialize};

use super::{FinishHook, RequestSample};
use crate::config::{ClassRule, SloSection};
use crate::error::Result;

pub const SLO_REQUESTS_METRIC: &str = "sample_app_slo_requests_total";
pub const SLO_ERRORS_METRIC: &str = "sample_app_slo_errors_total";

// ─── Label types ─────────────────────────────────────────────────

/// Importance tier of a request, used to apply different SLO policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestClass {
    Critical,
    HighFast,
    HighSlow,
    Low,
    NoSlo,
}

impl RequestClass {
    pub const ALL: [RequestClass; 5] = [
        RequestClass::Critical,
        RequestClass::HighFast,
        RequestClass::HighSlow,
        RequestClass::Low,
        RequestClass::NoSlo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Critical => "CRITICAL",
            RequestClass::HighFast => "HIGH_FAST",
            RequestClass::HighSlow => "HIGH_SLOW",
            RequestClass::Low => "LOW",
            RequestClass::NoSlo => "NO_SLO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SloId {
    #[serde(rename = "latency_p99_under_100ms")]
    LatencyP99Under100ms,
    #[serde(rename = "availability_p99_success")]
    AvailabilityP99Success,
}

impl SloId {
    pub const ALL: [SloId; 2] = [SloId::LatencyP99Under100ms, SloId::AvailabilityP99Success];

    pub fn as_str(&self) -> &'static str {
        match self {
            SloId::LatencyP99Under100ms => "latency_p99_under_100ms",
            SloId::AvailabilityP99Success => "availability_p99_success",
        }
    }
}

// ─── Classification ──────────────────────────────────────────────

/// Decides which [`RequestClass`] a finished request belongs to.
pub trait RequestClassifier: Send + Sync {
    fn classify(&self, sample: &RequestSample) -> RequestClass;
}

impl<F> RequestClassifier for F
where
    F: Fn(&RequestSample) -> RequestClass + Send + Sync,
{
    fn classify(&self, sample: &RequestSample) -> RequestClass {
        self(sample)
    }
}

/// Ordered path-prefix (and optional method) rules with a fallback class.
/// With no rules every request falls through to the fallback.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<ClassRule>,
    fallback: RequestClass,
}

impl RouteClassifier {
    pub fn new(rules: Vec<ClassRule>, fallback: RequestClass) -> Self {
        Self { rules, fallback }
    }

    pub fn from_config(cfg: &SloSection) -> Self {
        Self::new(cfg.rules.clone(), cfg.default_class)
    }
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::new(Vec::new(), RequestClass::Critical)
    }
}

impl RequestClassifier for RouteClassifier {
    fn classify(&self, sample: &RequestSample) -> RequestClass {
        self.rules
            .iter()
            .find(|rule| {
                path_has_prefix(&sample.path, &rule.path_prefix)
                    && rule
                        .method
                        .as_deref()
                        .map_or(true, |m| m.eq_ignore_ascii_case(&sample.method))
            })
            .map_or(self.fallback, |rule| rule.class)
    }
}

/// Prefix match on whole path segments: `/api` matches `/api` and
/// `/api/x` but not `/apiary`.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

// ─── Tracker ─────────────────────────────────────────────────────

/// Owns the SLO request/error counters and evaluates each finished request.
pub struct SloTracker {
    requests: IntCounterVec,
    errors: IntCounterVec,
    latency_threshold_secs: f64,
    classifier: Arc<dyn RequestClassifier>,
}

impl SloTracker {
    /// Registers both counter families and zero-initialises every
    /// `(slo, class)` pair so scrapes report 0 rather than nothing.
    pub fn register(
        registry: &Registry,
        latency_threshold_secs: f64,
        classifier: Arc<dyn RequestClassifier>,
    ) -> Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new(SLO_REQUESTS_METRIC, "Requests tracked per SLO and request class"),
            &["slo", "class"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new(SLO_ERRORS_METRIC, "SLO violations per SLO and request class"),
            &["slo", "class"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        for slo in SloId::ALL {
            for class in RequestClass::ALL {
                let labels = [slo.as_str(), class.as_str()];
                requests.with_label_values(&labels).reset();
                errors.with_label_values(&labels).reset();
            }
        }

        Ok(Self {
            requests,
            errors,
            latency_threshold_secs,
            classifier,
        })
    }

    pub fn requests(&self, slo: SloId, class: RequestClass) -> u64 {
        self.requests
            .with_label_values(&[slo.as_str(), class.as_str()])
            .get()
    }

    pub fn errors(&self, slo: SloId, class: RequestClass) -> u64 {
        self.errors
            .with_label_values(&[slo.as_str(), class.as_str()])
            .get()
    }

    /// Current counts for every `(slo, class)` pair.
    pub fn statuses(&self) -> Vec<SloStatus> {
        let mut out = Vec::with_capacity(SloId::ALL.len() * RequestClass::ALL.len());
        for slo in SloId::ALL {
            for class in RequestClass::ALL {
                // Read errors first so a concurrent increment can't make them exceed requests.
                let errors = self.errors(slo, class);
                let requests = self.requests(slo, class);
                out.push(SloStatus::new(slo, class, requests, errors));
            }
        }
        out
    }

    fn violations(&self, status: u16, duration_secs: f64) -> [(SloId, bool); 2] {
        [
            (
                SloId::LatencyP99Under100ms,
                duration_secs > self.latency_threshold_secs,
            ),
            (
                SloId::AvailabilityP99Success,
                (500..=599).contains(&status),
            ),
        ]
    }
}

impl FinishHook for SloTracker {
    fn on_request_finish(&self, sample: &RequestSample) {
        let Some((status, duration_secs)) = sample.checked() else {
            tracing::debug!(?sample, "skipping SLO evaluation for incomplete sample");
            return;
        };

        let class = self.classifier.classify(sample);

        // Requests first: errors are always a subset of tracked requests.
        for slo in SloId::ALL {
            self.requests
                .with_label_values(&[slo.as_str(), class.as_str()])
                .inc();
        }

        for (slo, violated) in self.violations(status, duration_secs) {
            if violated {
                self.errors
                    .with_label_values(&[slo.as_str(), class.as_str()])
                    .inc();
                tracing::trace!(slo = slo.as_str(), class = class.as_str(), status, duration_secs, "SLO violation");
            }
        }
    }
}

/// One `(slo, class)` row for the JSON snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SloStatus {
    pub slo: SloId,
    pub class: RequestClass,
    pub requests: u64,
    pub errors: u64,
    /// Fraction of tracked requests that met the objective; `None` without traffic.
    pub compliance: Option<f64>,
}

impl SloStatus {
    fn new(slo: SloId, class: RequestClass, requests: u64, errors: u64) -> Self {
        let compliance = (requests > 0).then(|| 1.0 - errors as f64 / requests as f64);
        Self {
            slo,
            class,
            requests,
            errors,
            compliance,
        }
    }
}
