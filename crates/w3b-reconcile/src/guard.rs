//! Invariant guard.
//!
//! The only check between a stale or truncated ledger read and an insolvent
//! published state. Every publish MUST pass through [`evaluate_guard`] and
//! MUST NOT proceed unless [`GuardVerdict::Approved`] is returned.
//!
//! Rules, in order:
//! 1. No baseline snapshot: refuse. An unreadable account is not permission.
//! 2. Protocol paused: refuse.
//! 3. `proposed < total_supply`: refuse. Never overridable.
//! 4. `proposed < proven_reserves`: refuse unless the operator override
//!    `allow_reserve_decrease` is set.

use std::fmt;

use serde::{Deserialize, Serialize};
use w3b_schemas::ProtocolStateSnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Bypasses rule 4 only.
    pub allow_reserve_decrease: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolatedRule {
    /// Publishing would leave supply above proven reserves.
    BelowSupply,
    /// Publishing would shrink proven reserves without a burn workflow.
    ReserveDecrease,
}

/// A refused publish, carrying every count needed for an actionable message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub proposed: u64,
    pub supply: u64,
    pub proven_reserves: u64,
    pub rule: ViolatedRule,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule {
            ViolatedRule::BelowSupply => write!(
                f,
                "INVARIANT_VIOLATION: proposed reserve count {} is below on-chain supply {} \
                 (proven_reserves={}); publishing would break solvency",
                self.proposed, self.supply, self.proven_reserves
            ),
            ViolatedRule::ReserveDecrease => write!(
                f,
                "INVARIANT_VIOLATION: proposed reserve count {} is below proven reserves {} \
                 (supply={}); a decrease requires the explicit operator override",
                self.proposed, self.proven_reserves, self.supply
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardRefusal {
    /// The state account could not be read; there is nothing to compare against.
    NoBaseline,
    ProtocolPaused,
    Violation(InvariantViolation),
}

impl fmt::Display for GuardRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardRefusal::NoBaseline => write!(
                f,
                "no on-chain safety baseline: protocol state could not be read, refusing to publish"
            ),
            GuardRefusal::ProtocolPaused => {
                write!(f, "protocol is paused, refusing to publish")
            }
            GuardRefusal::Violation(v) => v.fmt(f),
        }
    }
}

impl std::error::Error for GuardRefusal {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Approved,
    Refused(GuardRefusal),
}

impl GuardVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, GuardVerdict::Approved)
    }

    pub fn refusal(&self) -> Option<&GuardRefusal> {
        match self {
            GuardVerdict::Approved => None,
            GuardVerdict::Refused(r) => Some(r),
        }
    }
}

/// Decide whether `proposed` may be published over `baseline`.
pub fn evaluate_guard(
    proposed: u64,
    baseline: Option<&ProtocolStateSnapshot>,
    policy: GuardPolicy,
) -> GuardVerdict {
    let Some(snap) = baseline else {
        return GuardVerdict::Refused(GuardRefusal::NoBaseline);
    };

    if snap.is_paused {
        return GuardVerdict::Refused(GuardRefusal::ProtocolPaused);
    }

    let violation = |rule| {
        GuardVerdict::Refused(GuardRefusal::Violation(InvariantViolation {
            proposed,
            supply: snap.total_supply,
            proven_reserves: snap.proven_reserves,
            rule,
        }))
    };

    if proposed < snap.total_supply {
        return violation(ViolatedRule::BelowSupply);
    }
    if proposed < snap.proven_reserves && !policy.allow_reserve_decrease {
        return violation(ViolatedRule::ReserveDecrease);
    }

    GuardVerdict::Approved
}

#[cfg(test)]
mod tests {
    use super::*;
    use w3b_schemas::Address;

    fn snap(supply: u64, reserves: u64) -> ProtocolStateSnapshot {
        ProtocolStateSnapshot {
            layout_version: 2,
            authority: Address::default(),
            operator: Address::default(),
            mint_address: Address::default(),
            treasury_address: Address::default(),
            total_supply: supply,
            total_burned: 0,
            current_commitment_root: [0; 32],
            proven_reserves: reserves,
            last_update_timestamp: 0,
            last_proof_timestamp: 0,
            price_units: 0,
            is_paused: false,
            bump: 255,
        }
    }

    #[test]
    fn approves_growth_over_supply_and_reserves() {
        let v = evaluate_guard(3, Some(&snap(2, 2)), GuardPolicy::default());
        assert!(v.is_approved());
    }

    #[test]
    fn equal_counts_are_approved() {
        assert!(evaluate_guard(5, Some(&snap(5, 5)), GuardPolicy::default()).is_approved());
    }

    #[test]
    fn refuses_below_supply_with_both_counts() {
        let v = evaluate_guard(3, Some(&snap(5, 5)), GuardPolicy::default());
        assert_eq!(
            v,
            GuardVerdict::Refused(GuardRefusal::Violation(InvariantViolation {
                proposed: 3,
                supply: 5,
                proven_reserves: 5,
                rule: ViolatedRule::BelowSupply,
            }))
        );
        let msg = v.refusal().unwrap().to_string();
        assert!(msg.contains("proposed reserve count 3"));
        assert!(msg.contains("supply 5"));
    }

    #[test]
    fn refuses_reserve_decrease_without_override() {
        let v = evaluate_guard(4, Some(&snap(2, 6)), GuardPolicy::default());
        assert!(matches!(
            v,
            GuardVerdict::Refused(GuardRefusal::Violation(InvariantViolation {
                rule: ViolatedRule::ReserveDecrease,
                ..
            }))
        ));
    }

    #[test]
    fn override_permits_decrease_but_not_below_supply() {
        let policy = GuardPolicy {
            allow_reserve_decrease: true,
        };
        assert!(evaluate_guard(4, Some(&snap(2, 6)), policy).is_approved());

        let v = evaluate_guard(1, Some(&snap(2, 6)), policy);
        assert!(matches!(
            v,
            GuardVerdict::Refused(GuardRefusal::Violation(InvariantViolation {
                rule: ViolatedRule::BelowSupply,
                ..
            }))
        ));
    }

    #[test]
    fn missing_baseline_is_refused_even_with_override() {
        let policy = GuardPolicy {
            allow_reserve_decrease: true,
        };
        assert_eq!(
            evaluate_guard(100, None, policy),
            GuardVerdict::Refused(GuardRefusal::NoBaseline)
        );
    }

    #[test]
    fn paused_protocol_is_refused() {
        let mut s = snap(0, 0);
        s.is_paused = true;
        assert_eq!(
            evaluate_guard(10, Some(&s), GuardPolicy::default()),
            GuardVerdict::Refused(GuardRefusal::ProtocolPaused)
        );
    }
}
