//! Quantile summary backed by HdrHistogram.
//!
//! `prometheus` has no client-side summary type, so this module provides one
//! as a custom [`Collector`]. Each label set owns a histogram recorded in
//! microseconds; quantiles are exported in seconds. `_sum` and `_count` are
//! cumulative for the process lifetime, while the quantile window can be
//! bounded with a max age.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use prometheus::core::{Collector, Desc};
use prometheus::proto;

use super::percentiles::PercentileSet;
use super::{FinishHook, RequestSample};
use crate::error::{AppError, Result};

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

const LABEL_NAMES: [&str; 2] = ["method", "status"];

type LabelKey = (String, String);

/// Cheap to clone: clones share the same series map.
#[derive(Clone)]
pub struct SummaryVec {
    desc: Desc,
    percentiles: Vec<f64>,
    max_age: Option<Duration>,
    series: Arc<RwLock<HashMap<LabelKey, Arc<Mutex<Series>>>>>,
}

struct Series {
    window: Histogram<u64>,
    window_start: Instant,
    sum_secs: f64,
    count: u64,
}

impl Series {
    fn new() -> Result<Self> {
        let window = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
            .map_err(|e| AppError::Internal(format!("histogram creation: {e}")))?;
        Ok(Self {
            window,
            window_start: Instant::now(),
            sum_secs: 0.0,
            count: 0,
        })
    }

    fn rotate_if_stale(&mut self, max_age: Option<Duration>) {
        if let Some(age) = max_age {
            if self.window_start.elapsed() >= age {
                self.window.reset();
                self.window_start = Instant::now();
            }
        }
    }

    fn observe(&mut self, secs: f64, max_age: Option<Duration>) {
        self.rotate_if_stale(max_age);
        let micros = (secs * 1_000_000.0).round() as u64;
        self.window.saturating_record(micros.max(HIST_LOW));
        self.sum_secs += secs;
        self.count += 1;
    }
}

impl SummaryVec {
    pub fn new(
        name: &str,
        help: &str,
        percentiles: Vec<f64>,
        max_age: Option<Duration>,
    ) -> Result<Self> {
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            LABEL_NAMES.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Self {
            desc,
            percentiles,
            max_age,
            series: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn observe(&self, method: &str, status: &str, secs: f64) {
        let series = match self.series_for(method, status) {
            Ok(series) => series,
            Err(err) => {
                tracing::warn!(%err, "dropping summary observation");
                return;
            }
        };
        series.lock().observe(secs, self.max_age);
    }

    fn series_for(&self, method: &str, status: &str) -> Result<Arc<Mutex<Series>>> {
        let key = (method.to_string(), status.to_string());
        if let Some(series) = self.series.read().get(&key) {
            return Ok(series.clone());
        }
        let mut map = self.series.write();
        if let Some(series) = map.get(&key) {
            return Ok(series.clone());
        }
        let series = Arc::new(Mutex::new(Series::new()?));
        map.insert(key, series.clone());
        Ok(series)
    }

    /// Quantiles for one label set over the current window.
    pub fn percentiles(&self, method: &str, status: &str) -> Option<PercentileSet> {
        let key = (method.to_string(), status.to_string());
        let series = self.series.read().get(&key)?.clone();
        let mut s = series.lock();
        s.rotate_if_stale(self.max_age);
        Some(PercentileSet::from_histogram(
            &s.window,
            &self.percentiles,
            s.sum_secs,
            s.count,
        ))
    }

    /// Every label set with its quantiles, sorted by label values.
    pub fn snapshot(&self) -> Vec<(LabelKey, PercentileSet)> {
        let mut keys: Vec<LabelKey> = self.series.read().keys().cloned().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|(method, status)| {
                let set = self.percentiles(&method, &status)?;
                Some(((method, status), set))
            })
            .collect()
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut family = proto::MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);

        for ((method, status), set) in self.snapshot() {
            let mut summary = proto::Summary::default();
            summary.set_sample_count(set.count);
            summary.set_sample_sum(set.sum_secs);
            for q in &set.quantiles {
                let mut quantile = proto::Quantile::default();
                quantile.set_quantile(q.quantile);
                quantile.set_value(q.seconds);
                summary.mut_quantile().push(quantile);
            }

            let mut metric = proto::Metric::default();
            for (name, value) in LABEL_NAMES.iter().zip([method, status]) {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.to_string());
                pair.set_value(value);
                metric.mut_label().push(pair);
            }
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

/// Finish hook feeding a shared [`SummaryVec`].
pub struct SummaryRecorder(pub SummaryVec);

impl FinishHook for SummaryRecorder {
    fn on_request_finish(&self, sample: &RequestSample) {
        if let Some((status, secs)) = sample.checked() {
            self.0.observe(&sample.method, &status.to_string(), secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, Registry, TextEncoder};

    fn summary(max_age: Option<Duration>) -> SummaryVec {
        SummaryVec::new(
            "test_summary_seconds",
            "test",
            vec![0.5, 0.75, 0.9, 0.95, 0.99],
            max_age,
        )
        .unwrap()
    }

    #[test]
    fn quantiles_follow_observations() {
        let s = summary(None);
        for ms in 1..=100 {
            s.observe("GET", "200", ms as f64 / 1000.0);
        }
        let set = s.percentiles("GET", "200").unwrap();
        assert_eq!(set.count, 100);
        assert!((set.sum_secs - 5.05).abs() < 1e-9);

        let p50 = set.quantiles[0].seconds;
        let p99 = set.quantiles[4].seconds;
        assert!((p50 - 0.050).abs() < 0.001, "p50 = {p50}");
        assert!((p99 - 0.099).abs() < 0.001, "p99 = {p99}");
        assert!(set.quantiles.windows(2).all(|w| w[0].seconds <= w[1].seconds));
    }

    #[test]
    fn label_sets_are_independent() {
        let s = summary(None);
        s.observe("GET", "200", 0.01);
        s.observe("GET", "500", 2.0);
        assert_eq!(s.percentiles("GET", "200").unwrap().count, 1);
        assert_eq!(s.percentiles("GET", "500").unwrap().count, 1);
        assert!(s.percentiles("POST", "200").is_none());
    }

    #[test]
    fn expired_window_drops_quantiles_but_keeps_totals() {
        let s = summary(Some(Duration::from_millis(20)));
        s.observe("GET", "200", 0.5);
        std::thread::sleep(Duration::from_millis(30));
        let set = s.percentiles("GET", "200").unwrap();
        assert_eq!(set.count, 1);
        assert!(set.quantiles.iter().all(|q| q.seconds.is_nan()));
    }

    #[test]
    fn empty_window_renders_nan_quantiles() {
        let s = summary(Some(Duration::from_millis(20)));
        s.observe("GET", "200", 0.5);
        std::thread::sleep(Duration::from_millis(30));
        let registry = Registry::new();
        registry.register(Box::new(s)).unwrap();

        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("test_summary_seconds{method=\"GET\",status=\"200\",quantile=\"0.99\"} NaN"));
        assert!(text.contains("test_summary_seconds_count{method=\"GET\",status=\"200\"} 1"));
    }

    #[test]
    fn renders_as_prometheus_summary() {
        let s = summary(None);
        s.observe("GET", "200", 0.02);
        let registry = Registry::new();
        registry.register(Box::new(s)).unwrap();

        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("# TYPE test_summary_seconds summary"));
        assert!(text.contains("test_summary_seconds{method=\"GET\",status=\"200\",quantile=\"0.99\"}"));
        assert!(text.contains("test_summary_seconds_count{method=\"GET\",status=\"200\"} 1"));
    }
}
