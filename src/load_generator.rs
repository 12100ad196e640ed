use axum::{body::Body, http::Request, Router};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tower::ServiceExt;

// ─── Run handle ──────────────────────────────────────────────────

/// One traffic-generation run. Each run owns its stop flag, so a run that
/// is winding down can never clear the flag of the run that replaced it.
pub struct LoadRun {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LoadRun {
    pub fn spawn(app: Router, concurrency: u32, duration_secs: u64, fail_pct: u8) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run(
            running.clone(),
            app,
            concurrency,
            duration_secs,
            fail_pct,
        ));
        Self { running, handle }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal all workers to stop and wait for the run to wind down.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(err) = self.handle.await {
            tracing::warn!(%err, "load generator task failed");
        }
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that send requests through the full
/// instrumented router until the deadline or the `running` flag is cleared.
/// `fail_pct` percent of requests go to `/fail`, the rest to `/`.
pub async fn run(
    running: Arc<AtomicBool>,
    app: Router,
    concurrency: u32,
    duration_secs: u64,
    fail_pct: u8,
) {
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let sent = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        let app = app.clone();
        let sent = sent.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, app, sent, deadline, fail_pct).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        if let Err(err) = h.await {
            tracing::warn!(%err, "load worker panicked");
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::info!(requests = sent.load(Ordering::Relaxed), "load generator finished");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    app: Router,
    sent: Arc<AtomicU64>,
    deadline: Instant,
    fail_pct: u8,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let uri = if rng.gen_range(0u8..100) < fail_pct {
            "/fail"
        } else {
            "/"
        };

        let req = match Request::builder().uri(uri).body(Body::empty()) {
            Ok(req) => req,
            Err(err) => {
                tracing::warn!(%err, worker = id, "could not build request");
                return;
            }
        };

        match app.clone().oneshot(req).await {
            Ok(_response) => {
                sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(never) => match never {},
        }

        // In-process calls may never hit a real await point.
        tokio::task::yield_now().await;
    }
}
