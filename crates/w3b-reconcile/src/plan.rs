//! Transaction sequence planning.
//!
//! A plan always lists the three steps in their mandatory order:
//! publish commitment, record proof, mint. Each step is either submitted or
//! skipped with a reason. Skips make retries idempotent: a run that lands on
//! the same root as the chain only does the work still outstanding.
//!
//! The mint delta is always derived from the pre-sequence snapshot's supply.

use serde::{Deserialize, Serialize};
use w3b_commitment::{reserve_proof_hash, Commitment};
use w3b_schemas::ProtocolStateSnapshot;

/// The ledger program refuses a mint when the last proof receipt is older
/// than this.
pub const PROOF_VALIDITY_SECS: i64 = 48 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    PublishCommitment,
    RecordProof,
    Mint,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::PublishCommitment => "publish_commitment",
            StepKind::RecordProof => "record_proof",
            StepKind::Mint => "mint",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Root and reserve count are already on-chain.
    AlreadyPublished,
    /// A receipt newer than the last publish is already recorded.
    AlreadyAttested,
    /// Supply already covers the reserve count.
    NoSupplyDelta,
    /// Auto-mint disabled by config or operator flag.
    MintDisabled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    /// `None` means submit.
    pub skip: Option<SkipReason>,
}

impl PlannedStep {
    pub fn is_submitted(&self) -> bool {
        self.skip.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePlan {
    pub root: [u8; 32],
    pub total_serials: u64,
    pub proof_hash: [u8; 32],
    /// `total_serials - before.total_supply`; zero when nothing is owed.
    pub mint_amount: u64,
    /// Always `[PublishCommitment, RecordProof, Mint]`.
    pub steps: [PlannedStep; 3],
}

impl SequencePlan {
    pub fn submitted(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|s| s.is_submitted())
    }

    pub fn is_noop(&self) -> bool {
        self.submitted().next().is_none()
    }
}

/// Plan the on-chain steps for `commitment` over the pre-sequence snapshot.
///
/// Call only after the guard approved `commitment.leaf_count`.
pub fn plan_sequence(
    commitment: &Commitment,
    before: &ProtocolStateSnapshot,
    mint_enabled: bool,
    now_unix: i64,
) -> SequencePlan {
    let already_published = before.current_commitment_root == commitment.root
        && before.proven_reserves == commitment.leaf_count;

    let mint_amount = commitment.leaf_count.saturating_sub(before.total_supply);
    let mint_skip = if !mint_enabled {
        Some(SkipReason::MintDisabled)
    } else if mint_amount == 0 {
        Some(SkipReason::NoSupplyDelta)
    } else {
        None
    };

    // A fresh publish always needs a fresh receipt. An existing receipt is
    // reused only if it is newer than the publish and, when a mint follows,
    // still inside the program's validity window.
    let receipt_usable = already_published
        && before.proof_is_current()
        && (mint_skip.is_some() || now_unix - before.last_proof_timestamp < PROOF_VALIDITY_SECS);

    SequencePlan {
        root: commitment.root,
        total_serials: commitment.leaf_count,
        proof_hash: reserve_proof_hash(&commitment.root, commitment.leaf_count),
        mint_amount,
        steps: [
            PlannedStep {
                kind: StepKind::PublishCommitment,
                skip: already_published.then_some(SkipReason::AlreadyPublished),
            },
            PlannedStep {
                kind: StepKind::RecordProof,
                skip: receipt_usable.then_some(SkipReason::AlreadyAttested),
            },
            PlannedStep {
                kind: StepKind::Mint,
                skip: mint_skip,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use w3b_commitment::build_commitment;
    use w3b_schemas::Address;

    const NOW: i64 = 1_700_000_000;

    fn before(supply: u64, reserves: u64, root: [u8; 32]) -> ProtocolStateSnapshot {
        ProtocolStateSnapshot {
            layout_version: 2,
            authority: Address::default(),
            operator: Address::default(),
            mint_address: Address::default(),
            treasury_address: Address::default(),
            total_supply: supply,
            total_burned: 0,
            current_commitment_root: root,
            proven_reserves: reserves,
            last_update_timestamp: NOW - 100,
            last_proof_timestamp: NOW - 50,
            price_units: 0,
            is_paused: false,
            bump: 255,
        }
    }

    fn kinds_submitted(plan: &SequencePlan) -> Vec<StepKind> {
        plan.submitted().map(|s| s.kind).collect()
    }

    #[test]
    fn fresh_root_submits_all_three_in_order() {
        let c = build_commitment(&["GB-1", "GB-2", "GB-3"]).unwrap();
        let plan = plan_sequence(&c, &before(2, 2, [0; 32]), true, NOW);
        assert_eq!(
            kinds_submitted(&plan),
            vec![StepKind::PublishCommitment, StepKind::RecordProof, StepKind::Mint]
        );
        assert_eq!(plan.total_serials, 3);
        assert_eq!(plan.mint_amount, 1);
        assert_eq!(plan.proof_hash, reserve_proof_hash(&c.root, 3));
    }

    #[test]
    fn mint_disabled_still_publishes_and_attests() {
        let c = build_commitment(&["GB-1", "GB-2", "GB-3"]).unwrap();
        let plan = plan_sequence(&c, &before(2, 2, [0; 32]), false, NOW);
        assert_eq!(plan.steps[2].skip, Some(SkipReason::MintDisabled));
        assert_eq!(
            kinds_submitted(&plan),
            vec![StepKind::PublishCommitment, StepKind::RecordProof]
        );
    }

    #[test]
    fn retry_after_failed_mint_only_mints() {
        let c = build_commitment(&["GB-1", "GB-2", "GB-3"]).unwrap();
        // Root and receipt landed last run; supply still 2.
        let plan = plan_sequence(&c, &before(2, 3, c.root), true, NOW);
        assert_eq!(plan.steps[0].skip, Some(SkipReason::AlreadyPublished));
        assert_eq!(plan.steps[1].skip, Some(SkipReason::AlreadyAttested));
        assert_eq!(kinds_submitted(&plan), vec![StepKind::Mint]);
        assert_eq!(plan.mint_amount, 1);
    }

    #[test]
    fn fully_reconciled_state_is_a_noop() {
        let c = build_commitment(&["GB-1", "GB-2"]).unwrap();
        let plan = plan_sequence(&c, &before(2, 2, c.root), true, NOW);
        assert!(plan.is_noop());
        assert_eq!(plan.steps[2].skip, Some(SkipReason::NoSupplyDelta));
    }

    #[test]
    fn published_but_unattested_root_records_proof() {
        let c = build_commitment(&["GB-1", "GB-2"]).unwrap();
        let mut b = before(2, 2, c.root);
        b.last_proof_timestamp = b.last_update_timestamp - 1;
        let plan = plan_sequence(&c, &b, true, NOW);
        assert_eq!(kinds_submitted(&plan), vec![StepKind::RecordProof]);
    }

    #[test]
    fn expired_receipt_is_renewed_before_a_mint() {
        let c = build_commitment(&["GB-1", "GB-2", "GB-3"]).unwrap();
        let b = before(2, 3, c.root);
        let later = b.last_proof_timestamp + PROOF_VALIDITY_SECS;
        let plan = plan_sequence(&c, &b, true, later);
        assert_eq!(
            kinds_submitted(&plan),
            vec![StepKind::RecordProof, StepKind::Mint]
        );
    }

    #[test]
    fn same_count_different_root_republishes() {
        let c = build_commitment(&["GB-1", "GB-9"]).unwrap();
        let plan = plan_sequence(&c, &before(2, 2, [7; 32]), true, NOW);
        assert!(plan.steps[0].is_submitted());
        assert!(plan.steps[1].is_submitted());
        assert_eq!(plan.steps[2].skip, Some(SkipReason::NoSupplyDelta));
    }
}
