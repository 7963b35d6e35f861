//! Shared runtime state for w3b-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Runs are executed on
//! detached tasks (see [`spawn_reserve_run`]) so a dropped HTTP connection
//! never abandons a run mid-sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;
use w3b_runtime::{
    LogLevel, LogTap, PriceReconciler, PriceReport, ReconciliationReport, ReconciliationRequest,
    ReserveReconciler, RunLogLine,
};

use crate::api_types::{AnyReport, ReportSummary};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    LogLine {
        run_id: Uuid,
        level: String,
        msg: String,
    },
    Report(AnyReport),
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub runs_in_flight: usize,
    pub price_sync_enabled: bool,
    pub last_report: Option<ReportSummary>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub reserve: Arc<ReserveReconciler>,
    /// `None` when no price source is configured.
    pub price: Option<Arc<PriceReconciler>>,
    pub last_report: RwLock<Option<AnyReport>>,
    in_flight: AtomicUsize,
}

impl AppState {
    /// Wire both runners' log output onto the bus.
    pub fn new(reserve: ReserveReconciler, price: Option<PriceReconciler>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let tap = bus_log_tap(bus.clone());

        Self {
            bus,
            build: BuildInfo {
                service: "w3b-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            reserve: Arc::new(reserve.with_log_tap(tap.clone())),
            price: price.map(|p| Arc::new(p.with_log_tap(tap))),
            last_report: RwLock::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn runs_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            runs_in_flight: self.runs_in_flight(),
            price_sync_enabled: self.price.is_some(),
            last_report: self.last_report.read().await.as_ref().map(AnyReport::summary),
        }
    }

    async fn publish(&self, report: AnyReport) {
        *self.last_report.write().await = Some(report.clone());
        let _ = self.bus.send(BusMsg::Report(report));
    }
}

/// Counts a run as in flight for as long as it is alive.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn bus_log_tap(bus: broadcast::Sender<BusMsg>) -> LogTap {
    Arc::new(move |line: &RunLogLine| {
        let level = match line.level {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        let _ = bus.send(BusMsg::LogLine {
            run_id: line.run_id,
            level: level.to_string(),
            msg: line.message.clone(),
        });
    })
}

// ---------------------------------------------------------------------------
// Run spawning
// ---------------------------------------------------------------------------

/// Run the reserve reconciler on a detached task.
pub fn spawn_reserve_run(
    state: Arc<AppState>,
    req: ReconciliationRequest,
) -> JoinHandle<ReconciliationReport> {
    tokio::spawn(async move {
        let _guard = InFlight::enter(&state.in_flight);
        let report = state.reserve.run(req).await;
        state.publish(AnyReport::Reserve(report.clone())).await;
        report
    })
}

/// Run the price reconciler on a detached task. `None` when price sync is
/// not configured.
pub fn spawn_price_run(state: Arc<AppState>) -> Option<JoinHandle<PriceReport>> {
    let price = state.price.clone()?;
    Some(tokio::spawn(async move {
        let _guard = InFlight::enter(&state.in_flight);
        let report = price.run().await;
        state.publish(AnyReport::Price(report.clone())).await;
        report
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Trigger a scheduled reserve run every `interval`. A zero interval
/// disables the schedule. A tick is skipped while an earlier scheduled run
/// is still going.
pub fn spawn_reconcile_schedule(state: Arc<AppState>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    info!(secs = interval.as_secs(), "reconcile schedule enabled");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let run = spawn_reserve_run(Arc::clone(&state), ReconciliationRequest::scheduled());
            if let Ok(report) = run.await {
                info!(run_id = %report.run_id, success = report.success, "scheduled reconcile finished");
            }
        }
    }))
}
