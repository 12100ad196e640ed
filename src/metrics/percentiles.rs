use hdrhistogram::Histogram;
use serde::Serialize;

/// One configured quantile and its value in seconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuantileValue {
    pub quantile: f64,
    pub seconds: f64,
}

/// A percentile breakdown for one `(method, status)` label set.
/// Serialized straight into the JSON snapshot and fed to the summary collector.
#[derive(Debug, Clone, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub sum_secs: f64,
    pub mean_secs: f64,
    pub quantiles: Vec<QuantileValue>,
}

impl PercentileSet {
    /// Extract the configured quantiles from a microsecond HdrHistogram.
    /// `sum_secs`/`count` are lifetime totals and may cover more samples
    /// than the histogram window. Quantiles are NaN if the window is empty.
    pub fn from_histogram(
        hist: &Histogram<u64>,
        quantiles: &[f64],
        sum_secs: f64,
        count: u64,
    ) -> Self {
        let window_empty = hist.len() == 0;
        let quantiles = quantiles
            .iter()
            .map(|&q| QuantileValue {
                quantile: q,
                seconds: if window_empty {
                    f64::NAN
                } else {
                    hist.value_at_quantile(q) as f64 / 1_000_000.0
                },
            })
            .collect();

        Self {
            count,
            sum_secs,
            mean_secs: if count > 0 { sum_secs / count as f64 } else { 0.0 },
            quantiles,
        }
    }
}
