//! w3b-reconcile
//!
//! Decision logic for the reserve and price reconcilers:
//! - `guard`: may a new reserve count be published at all?
//! - `plan`: which on-chain steps does this run submit, and in what order?
//! - `price`: does the on-chain price need to move, and by how much?
//!
//! Deterministic, pure logic. No IO. No clock: callers pass `now`.

pub mod guard;
pub mod plan;
pub mod price;

pub use guard::{evaluate_guard, GuardPolicy, GuardRefusal, GuardVerdict, InvariantViolation, ViolatedRule};
pub use plan::{plan_sequence, PlannedStep, SequencePlan, SkipReason, StepKind, PROOF_VALIDITY_SECS};
pub use price::{price_decision, PriceDecision, PricePolicy, PriceRejection};
