//! Price drift decision.
//!
//! Integer basis-point math only; `diff * 10_000 < threshold_bps * current`
//! means the drift is noise and nothing is published.

use std::fmt;

use serde::{Deserialize, Serialize};

const BPS: u128 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePolicy {
    pub drift_threshold_bps: u32,
    /// Largest move the program accepts in one publish.
    pub max_step_bps: u32,
}

impl Default for PricePolicy {
    fn default() -> Self {
        Self {
            drift_threshold_bps: 100,
            max_step_bps: 2_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceRejection {
    /// The program refuses a zero price.
    ZeroCandidate,
}

impl fmt::Display for PriceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceRejection::ZeroCandidate => write!(f, "candidate price is zero"),
        }
    }
}

impl std::error::Error for PriceRejection {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PriceDecision {
    Skip { drift_bps: u64 },
    Publish { price: u64, drift_bps: u64, clamped: bool },
    Reject { reason: PriceRejection },
}

/// Compare `candidate` with the on-chain `current` price.
///
/// `drift_bps` saturates at `u64::MAX` when `current` is zero.
pub fn price_decision(current: u64, candidate: u64, policy: PricePolicy) -> PriceDecision {
    if candidate == 0 {
        return PriceDecision::Reject {
            reason: PriceRejection::ZeroCandidate,
        };
    }
    if current == 0 {
        // Price never set: publish as-is.
        return PriceDecision::Publish {
            price: candidate,
            drift_bps: u64::MAX,
            clamped: false,
        };
    }

    let cur = u128::from(current);
    let diff = u128::from(current.abs_diff(candidate));
    let drift_bps = u64::try_from(diff * BPS / cur).unwrap_or(u64::MAX);

    if diff * BPS < u128::from(policy.drift_threshold_bps) * cur {
        return PriceDecision::Skip { drift_bps };
    }

    if diff * BPS > u128::from(policy.max_step_bps) * cur {
        // current * max_step_bps / 10_000 <= current, so this fits in u64.
        let step = u64::try_from(cur * u128::from(policy.max_step_bps) / BPS).unwrap_or(current);
        let price = if candidate > current {
            current.saturating_add(step)
        } else {
            current.saturating_sub(step).max(1)
        };
        return PriceDecision::Publish {
            price,
            drift_bps,
            clamped: true,
        };
    }

    PriceDecision::Publish {
        price: candidate,
        drift_bps,
        clamped: false,
    }
}
