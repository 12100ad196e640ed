//! Sample HTTP server instrumented with request-latency metrics and SLO
//! counters, scraped from `/metrics`.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod load_generator;
pub mod metrics;
pub mod middleware;
pub mod server;

use config::AppConfig;
use error::Result;
use load_generator::LoadRun;
use metrics::MetricsContext;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Registry plus every instrument — the timing middleware pushes samples,
    /// the scrape and JSON endpoints read it.
    pub metrics: Arc<MetricsContext>,

    /// Current (or last) load-generator run; the lock serialises start/stop.
    pub load: tokio::sync::Mutex<Option<LoadRun>>,
}

impl AppState {
    pub fn new(config: AppConfig, metrics: Arc<MetricsContext>) -> Self {
        Self {
            config: Arc::new(config),
            metrics,
            load: tokio::sync::Mutex::new(None),
        }
    }

    /// State whose metrics use the classifier described in `config.slo`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let metrics = Arc::new(MetricsContext::from_config(&config)?);
        Ok(Self::new(config, metrics))
    }
}
