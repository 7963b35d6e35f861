//! Scenario: the guard refuses unsafe commitments before any chain mutation.

use w3b_chain::{ChainRpc, Instruction, SignatureStatus};
use w3b_runtime::{ErrorKind, ReconciliationRequest, RunOutcome, TriggerInput};
use w3b_testkit::{serials, snapshot, Harness};

#[tokio::test]
async fn ledger_below_supply_is_refused_without_chain_calls() {
    let h = Harness::new(&serials(3), snapshot(5, 5));

    let report = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert!(!report.success);
    assert_eq!(report.outcome, RunOutcome::Refused);
    assert_eq!(report.error_kind(), Some(ErrorKind::InvariantViolation));
    let msg = &report.error.as_ref().unwrap().message;
    assert!(msg.contains("proposed reserve count 3"), "{msg}");
    assert!(msg.contains("below on-chain supply 5"), "{msg}");
    assert_eq!(h.program.submit_count(), 0);
    assert_eq!(h.audit.row_count(), 0);
    assert!(report.steps.is_empty());
}

#[tokio::test]
async fn guard_is_the_only_check_against_publishing_below_supply() {
    let h = Harness::new(&serials(3), snapshot(5, 5));

    let refused = h.reserve().run(ReconciliationRequest::scheduled()).await;
    assert_eq!(refused.outcome, RunOutcome::Refused);
    assert_eq!(h.program.submit_count(), 0);

    // The program itself lands the same undersized publish.
    let sig = h
        .program
        .submit(&Instruction::PublishCommitment {
            root: [7; 32],
            total_serials: 3,
        })
        .await
        .unwrap();
    assert_eq!(
        h.program.signature_status(&sig).await.unwrap(),
        SignatureStatus::Confirmed
    );
    assert_eq!(h.program.state().proven_reserves, 3);
}

#[tokio::test]
async fn reserve_decrease_needs_an_override() {
    let h = Harness::new(&serials(3), snapshot(2, 5));

    let refused = h.reserve().run(ReconciliationRequest::scheduled()).await;
    assert_eq!(refused.outcome, RunOutcome::Refused);
    assert!(refused
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("below proven reserves 5"));
    assert_eq!(h.program.submit_count(), 0);

    let manual: TriggerInput = serde_json::from_str(
        r#"{"kind":"manual_action","operator":"ops","allow_reserve_decrease":true}"#,
    )
    .unwrap();
    let report = h.reserve().run(manual.into()).await;

    assert!(report.success, "log: {:#?}", report.log);
    assert!(report
        .log
        .iter()
        .any(|l| l.starts_with("WARN: operator override active")));
    let after = h.program.state();
    assert_eq!(after.proven_reserves, 3);
    assert_eq!(after.total_supply, 3);
}

#[tokio::test]
async fn override_never_permits_reserves_below_supply() {
    let mut h = Harness::new(&serials(4), snapshot(5, 6));
    h.settings.allow_reserve_decrease = true;

    let report = h.reserve().run(ReconciliationRequest::cli(true, false)).await;

    assert_eq!(report.outcome, RunOutcome::Refused);
    assert!(report
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("below on-chain supply 5"));
    assert_eq!(h.program.submit_count(), 0);
}

#[tokio::test]
async fn paused_protocol_is_refused() {
    let mut state = snapshot(0, 0);
    state.is_paused = true;
    let h = Harness::new(&serials(2), state);

    let report = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert_eq!(report.outcome, RunOutcome::Refused);
    assert_eq!(report.error_kind(), Some(ErrorKind::InvariantViolation));
    assert_eq!(h.program.submit_count(), 0);
}
