pub mod collector;
pub mod percentiles;
pub mod slo;
pub mod stream;
pub mod summary;

use std::time::Duration;

pub use collector::{MetricsContext, MetricsSnapshot};
pub use slo::{RequestClass, RequestClassifier, RouteClassifier, SloId, SloTracker};

/// Methods kept verbatim in the `method` label.
const KNOWN_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Label used for any method outside [`KNOWN_METHODS`]. Keeps label
/// cardinality bounded whatever method tokens clients send.
pub const OTHER_METHOD: &str = "other";

/// Canonical label value for a request method.
pub fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|m| **m == method)
        .copied()
        .unwrap_or(OTHER_METHOD)
}

/// A finished request, as seen by the instrumentation hooks.
/// The timing middleware builds one of these per response.
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// e.g. "GET"; non-standard methods are folded into `"other"`
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// `None` when the status could not be determined
    pub status: Option<u16>,
    /// Wall time from request start to response completion (seconds)
    pub duration_secs: Option<f64>,
}

impl RequestSample {
    pub fn new(method: &str, path: impl Into<String>, status: u16, elapsed: Duration) -> Self {
        Self {
            method: method_label(method).to_string(),
            path: path.into(),
            status: Some(status),
            duration_secs: Some(elapsed.as_secs_f64()),
        }
    }

    /// Status and duration, if both are usable. Hooks skip the sample otherwise.
    pub fn checked(&self) -> Option<(u16, f64)> {
        let status = self.status.filter(|s| (100..=999).contains(s))?;
        let secs = self.duration_secs.filter(|d| d.is_finite() && *d >= 0.0)?;
        Some((status, secs))
    }
}

/// Callback fired once per finished request.
///
/// Hooks run synchronously in registration order and must never panic or
/// block: a metrics failure must not affect the request being measured.
pub trait FinishHook: Send + Sync {
    fn on_request_finish(&self, sample: &RequestSample);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_rejects_missing_or_invalid_inputs() {
        let ok = RequestSample::new("GET", "/", 200, Duration::from_millis(5));
        assert_eq!(ok.checked(), Some((200, 0.005)));

        let mut no_status = ok.clone();
        no_status.status = None;
        assert!(no_status.checked().is_none());

        let mut bogus_status = ok.clone();
        bogus_status.status = Some(42);
        assert!(bogus_status.checked().is_none());

        let mut nan = ok.clone();
        nan.duration_secs = Some(f64::NAN);
        assert!(nan.checked().is_none());

        let mut negative = ok;
        negative.duration_secs = Some(-1.0);
        assert!(negative.checked().is_none());
    }

    #[test]
    fn unknown_methods_share_one_label() {
        for m in ["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"] {
            assert_eq!(RequestSample::new(m, "/", 200, Duration::ZERO).method, m);
        }
        for m in ["X0", "PROPFIND", "get", ""] {
            assert_eq!(RequestSample::new(m, "/", 200, Duration::ZERO).method, OTHER_METHOD);
        }
    }
}
