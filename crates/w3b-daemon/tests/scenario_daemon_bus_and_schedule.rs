//! Scenario: run log lines and reports reach the event bus, and the
//! scheduler triggers reserve runs on its own.

use std::sync::Arc;
use std::time::Duration;

use w3b_daemon::state::{self, BusMsg};
use w3b_runtime::{ReconciliationRequest, TriggerSource};
use w3b_testkit::{serials, snapshot, Harness};

#[tokio::test]
async fn run_output_is_broadcast() {
    let h = Harness::new(&serials(2), snapshot(0, 0));
    let st = Arc::new(state::AppState::new(h.reserve(), None));
    let mut rx = st.bus.subscribe();

    let report = state::spawn_reserve_run(Arc::clone(&st), ReconciliationRequest::scheduled())
        .await
        .unwrap();
    assert!(report.success);

    let mut log_lines = 0;
    let mut reports = 0;
    while let Ok(msg) = rx.try_recv() {
        match msg {
            BusMsg::LogLine { run_id, .. } => {
                assert_eq!(run_id, report.run_id);
                log_lines += 1;
            }
            BusMsg::Report(_) => reports += 1,
            BusMsg::Heartbeat { .. } => {}
        }
    }
    assert_eq!(log_lines, report.log.len());
    assert_eq!(reports, 1);
    assert!(st.last_report.read().await.is_some());
}

#[tokio::test]
async fn zero_interval_disables_the_schedule() {
    let h = Harness::new(&serials(2), snapshot(0, 0));
    let st = Arc::new(state::AppState::new(h.reserve(), None));

    assert!(state::spawn_reconcile_schedule(st, Duration::ZERO).is_none());
}

#[tokio::test]
async fn schedule_runs_reconciliation() {
    let h = Harness::new(&serials(2), snapshot(0, 0));
    let st = Arc::new(state::AppState::new(h.reserve(), None));

    let task = state::spawn_reconcile_schedule(Arc::clone(&st), Duration::from_millis(50)).unwrap();

    let mut waited = Duration::ZERO;
    while st.last_report.read().await.is_none() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    task.abort();

    match st.last_report.read().await.clone() {
        Some(w3b_daemon::api_types::AnyReport::Reserve(r)) => {
            assert_eq!(r.trigger, TriggerSource::Scheduled);
            assert!(r.success);
        }
        other => panic!("expected a scheduled reserve report, got {other:?}"),
    }
    assert_eq!(h.program.state().total_supply, 2);
}
