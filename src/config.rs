//! YAML configuration (strict parsing, every field defaulted).

use std::fs;
use std::net::SocketAddr;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::metrics::slo::RequestClass;

/// Environment variable naming the YAML file to load.
pub const CONFIG_ENV: &str = "SAMPLE_APP_CONFIG";

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<AppConfig> {
    let cfg: AppConfig =
        serde_yaml::from_str(s).map_err(|e| AppError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads the file named by `SAMPLE_APP_CONFIG`, or falls back to defaults.
pub fn load_from_env() -> Result<AppConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => load_from_file(&path),
        Err(_) => Ok(AppConfig::default()),
    }
}

// ─── Schema ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub slo: SloSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub delay: DelaySection,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.slo.validate()?;
        self.metrics.validate()?;
        self.delay.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            AppError::Config(format!("server.listen {:?} is not a socket address: {e}", self.listen))
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SloSection {
    /// Per-request latency above this many seconds counts as a violation.
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_seconds: f64,

    /// Class assigned when no rule matches.
    #[serde(default = "default_class")]
    pub default_class: RequestClass,

    /// Evaluated in order; first match wins.
    #[serde(default)]
    pub rules: Vec<ClassRule>,
}

impl Default for SloSection {
    fn default() -> Self {
        Self {
            latency_threshold_seconds: default_latency_threshold(),
            default_class: default_class(),
            rules: Vec::new(),
        }
    }
}

impl SloSection {
    pub fn validate(&self) -> Result<()> {
        let t = self.latency_threshold_seconds;
        if !t.is_finite() || t <= 0.0 {
            return Err(AppError::Config(
                "slo.latency_threshold_seconds must be a positive number".into(),
            ));
        }
        for rule in &self.rules {
            if !rule.path_prefix.starts_with('/') {
                return Err(AppError::Config(format!(
                    "slo.rules path_prefix {:?} must start with '/'",
                    rule.path_prefix
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassRule {
    pub path_prefix: String,

    /// Matches any method when absent.
    #[serde(default)]
    pub method: Option<String>,

    pub class: RequestClass,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_buckets")]
    pub buckets: Vec<f64>,

    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    /// Quantile window length. `None` keeps every observation.
    #[serde(default)]
    pub summary_max_age_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub process_metrics: bool,

    /// Tick of the `/api/metrics/stream` SSE feed.
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            percentiles: default_percentiles(),
            summary_max_age_secs: None,
            process_metrics: true,
            stream_interval_ms: default_stream_interval_ms(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(AppError::Config("metrics.buckets must not be empty".into()));
        }
        if self.buckets.iter().any(|b| !b.is_finite()) {
            return Err(AppError::Config("metrics.buckets must be finite".into()));
        }
        if self.buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::Config(
                "metrics.buckets must be strictly increasing".into(),
            ));
        }
        if self.percentiles.is_empty() {
            return Err(AppError::Config("metrics.percentiles must not be empty".into()));
        }
        if self.percentiles.iter().any(|p| !(*p > 0.0 && *p < 1.0)) {
            return Err(AppError::Config(
                "metrics.percentiles must lie strictly between 0 and 1".into(),
            ));
        }
        if self.stream_interval_ms < 50 {
            return Err(AppError::Config(
                "metrics.stream_interval_ms must be at least 50".into(),
            ));
        }
        if self.summary_max_age_secs == Some(0) {
            return Err(AppError::Config(
                "metrics.summary_max_age_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelaySection {
    /// Fraction of `GET /` requests that sleep before answering.
    #[serde(default = "default_delay_probability")]
    pub probability: f64,

    #[serde(default = "default_delay_ms")]
    pub duration_ms: u64,
}

impl Default for DelaySection {
    fn default() -> Self {
        Self {
            probability: default_delay_probability(),
            duration_ms: default_delay_ms(),
        }
    }
}

impl DelaySection {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(AppError::Config(
                "delay.probability must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:4000".into()
}
fn default_latency_threshold() -> f64 {
    0.1
}
fn default_class() -> RequestClass {
    RequestClass::Critical
}
fn default_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}
fn default_percentiles() -> Vec<f64> {
    vec![0.5, 0.75, 0.9, 0.95, 0.99]
}
fn default_true() -> bool {
    true
}
fn default_stream_interval_ms() -> u64 {
    500
}
fn default_delay_probability() -> f64 {
    0.05
}
fn default_delay_ms() -> u64 {
    1000
}
