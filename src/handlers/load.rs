use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::load_generator::LoadRun;
use crate::AppState;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent Tokio tasks generating load
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the run lasts (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of requests sent to `/fail` (0–100)
    #[serde(default = "default_fail_pct")]
    pub fail_pct: u8,
}

fn default_concurrency() -> u32 {
    10
}
fn default_duration() -> u64 {
    30
}
fn default_fail_pct() -> u8 {
    5
}

impl LoadConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 || self.concurrency > 500 {
            return Err(AppError::BadRequest(
                "concurrency must be between 1 and 500".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 300 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 300".into(),
            ));
        }
        if self.fail_pct > 100 {
            return Err(AppError::BadRequest(
                "fail_pct must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(
    State(state): State<Arc<AppState>>,
    Json(config): Json<LoadConfig>,
) -> Result<Json<LoadStatus>> {
    config.validate()?;

    // Only one run at a time; a finished run is simply replaced.
    let mut current = state.load.lock().await;
    if current.as_ref().is_some_and(LoadRun::is_running) {
        return Err(AppError::AlreadyRunning);
    }

    let msg = format!(
        "Load started: {} workers, {}s, {}% failures",
        config.concurrency, config.duration_secs, config.fail_pct
    );
    tracing::info!(
        concurrency = config.concurrency,
        duration_secs = config.duration_secs,
        fail_pct = config.fail_pct,
        "starting load generator"
    );

    let app = crate::server::create_router(state.clone());
    *current = Some(LoadRun::spawn(
        app,
        config.concurrency,
        config.duration_secs,
        config.fail_pct,
    ));

    Ok(Json(LoadStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let mut current = state.load.lock().await;
    let Some(run) = current.take() else {
        return Json(LoadStatus {
            running: false,
            message: "No load run in progress".into(),
        });
    };

    let was_running = run.is_running();
    run.stop().await;

    Json(LoadStatus {
        running: false,
        message: if was_running {
            "Load stopped".into()
        } else {
            "No load run in progress".into()
        },
    })
}

// ─── GET /api/load/status ────────────────────────────────────────

pub async fn load_status(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let running = state
        .load
        .lock()
        .await
        .as_ref()
        .is_some_and(LoadRun::is_running);
    Json(LoadStatus {
        running,
        message: if running {
            "Load in progress".into()
        } else {
            "Idle".into()
        },
    })
}
