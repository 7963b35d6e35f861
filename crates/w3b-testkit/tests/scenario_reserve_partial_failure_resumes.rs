//! Scenario: a step fails mid-sequence.
//!
//! Earlier steps stay applied, later steps are not attempted, the audit row
//! records how far the root got, and the next run only does what is still
//! outstanding.

use w3b_commitment::build_commitment;
use w3b_reconcile::{SkipReason, StepKind};
use w3b_runtime::{ErrorKind, ReconciliationRequest, RunOutcome, StepStatus};
use w3b_schemas::AuditStatus;
use w3b_testkit::{serials, snapshot, Harness, InjectedFailure};

#[tokio::test]
async fn failed_mint_is_retried_alone() {
    let ledger = serials(3);
    let h = Harness::new(&ledger, snapshot(2, 2));
    let root_hex = build_commitment(&ledger).unwrap().root_hex;
    h.program
        .fail_instruction("mint_w3b", InjectedFailure::Reverted("InsufficientFunds".into()));

    let first = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert!(!first.success);
    assert_eq!(first.outcome, RunOutcome::PartiallyApplied);
    assert_eq!(first.error_kind(), Some(ErrorKind::Transaction));
    assert_eq!(first.step(StepKind::PublishCommitment).unwrap().status, StepStatus::Confirmed);
    assert_eq!(first.step(StepKind::RecordProof).unwrap().status, StepStatus::Confirmed);
    assert_eq!(first.step(StepKind::Mint).unwrap().status, StepStatus::Failed);
    assert_eq!(h.program.state().total_supply, 2);
    assert_eq!(h.audit.get(&root_hex).unwrap().status, AuditStatus::Attested);
    // Reserves were published, supply lags: still solvent.
    assert_eq!(first.post_invariant_holds, Some(true));

    h.program.clear_failures();
    let before_retry = h.program.submit_count();
    let second = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert!(second.success, "log: {:#?}", second.log);
    assert_eq!(
        second.step(StepKind::PublishCommitment).unwrap().skip_reason,
        Some(SkipReason::AlreadyPublished)
    );
    assert_eq!(
        second.step(StepKind::RecordProof).unwrap().skip_reason,
        Some(SkipReason::AlreadyAttested)
    );
    assert_eq!(second.step(StepKind::Mint).unwrap().amount, 1);
    assert_eq!(&h.program.submitted_names()[before_retry..], &["mint_w3b"]);
    assert_eq!(h.program.state().total_supply, 3);

    let audit = h.audit.get(&root_hex).unwrap();
    assert_eq!(audit.status, AuditStatus::Complete);
    assert_eq!(
        audit.on_chain_tx_signature,
        first.step(StepKind::PublishCommitment).unwrap().signature,
        "the publish signature survives the retry"
    );
}

#[tokio::test]
async fn failed_proof_leaves_mint_unattempted() {
    let ledger = serials(3);
    let h = Harness::new(&ledger, snapshot(2, 2));
    let root_hex = build_commitment(&ledger).unwrap().root_hex;
    h.program
        .fail_instruction("submit_proof", InjectedFailure::Rejected("relay busy".into()));

    let report = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert_eq!(report.outcome, RunOutcome::PartiallyApplied);
    let statuses: Vec<_> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Confirmed, StepStatus::Failed, StepStatus::NotAttempted]
    );
    assert!(report.step(StepKind::RecordProof).unwrap().signature.is_none());
    assert_eq!(h.program.submitted_names(), vec!["update_merkle_root", "submit_proof"]);
    assert_eq!(h.program.state().proven_reserves, 3);
    assert_eq!(h.program.state().total_supply, 2);
    assert_eq!(h.audit.get(&root_hex).unwrap().status, AuditStatus::Published);

    h.program.clear_failures();
    let retry = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert!(retry.success);
    assert_eq!(
        retry.step(StepKind::PublishCommitment).unwrap().status,
        StepStatus::Skipped
    );
    assert_eq!(retry.step(StepKind::RecordProof).unwrap().status, StepStatus::Confirmed);
    assert_eq!(retry.step(StepKind::Mint).unwrap().status, StepStatus::Confirmed);
    assert_eq!(h.audit.row_count(), 1);
}

#[tokio::test]
async fn failed_publish_applies_nothing() {
    let h = Harness::new(&serials(3), snapshot(2, 2));
    h.program.fail_instruction("update_merkle_root", InjectedFailure::NeverConfirms);

    let report = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.error_kind(), Some(ErrorKind::Transaction));
    assert!(report.error.as_ref().unwrap().message.contains("unconfirmed"));
    assert!(report.step(StepKind::PublishCommitment).unwrap().signature.is_some());
    // Mint is never submitted ahead of the publish it depends on.
    assert_eq!(h.program.submitted_names(), vec!["update_merkle_root"]);
    assert_eq!(h.audit.row_count(), 0);
    assert_eq!(h.ledger.stamp_of("W3B-000001"), None);
}

#[tokio::test]
async fn stale_receipt_is_renewed_before_minting() {
    let ledger = serials(3);
    let h = Harness::new(&ledger, snapshot(2, 2));
    let commitment = build_commitment(&ledger).unwrap();

    let now = h.program.now();
    let mut state = snapshot(2, 3);
    state.current_commitment_root = commitment.root;
    state.last_update_timestamp = now - 100 * 3600;
    state.last_proof_timestamp = now - 50 * 3600;
    h.program.set_state(state);

    let report = h.reserve().run(ReconciliationRequest::scheduled()).await;

    assert!(report.success, "log: {:#?}", report.log);
    assert_eq!(h.program.submitted_names(), vec!["submit_proof", "mint_w3b"]);
    assert_eq!(h.program.state().total_supply, 3);
}
