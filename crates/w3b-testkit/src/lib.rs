//! w3b-testkit
//!
//! In-memory stand-ins for every boundary the runners touch, plus a small
//! harness that wires them together. Scenario tests under `tests/` drive the
//! real `ReserveReconciler` / `PriceReconciler` against these.

use std::sync::Arc;
use std::time::Duration;

use w3b_reconcile::PricePolicy;
use w3b_runtime::{PriceReconciler, PriceSettings, ReserveReconciler, ReserveSettings};
use w3b_schemas::{Address, ProtocolStateSnapshot};

mod program;
mod stores;

pub use program::{FakeProgram, InjectedFailure, MAX_PRICE_SWING_BPS};
pub use stores::{FakeAuditStore, FakeLedger, FixedPriceSource};

/// 32 zero bytes in base58.
pub const STATE_ADDRESS: &str = "11111111111111111111111111111111";

pub fn state_address() -> Address {
    STATE_ADDRESS.parse().expect("valid base58 address")
}

/// Protocol state with the given supply and reserves; everything else zero
/// and unpaused.
pub fn snapshot(total_supply: u64, proven_reserves: u64) -> ProtocolStateSnapshot {
    ProtocolStateSnapshot {
        layout_version: 2,
        authority: Address::default(),
        operator: Address::default(),
        mint_address: Address::default(),
        treasury_address: Address::default(),
        total_supply,
        total_burned: 0,
        current_commitment_root: [0u8; 32],
        proven_reserves,
        last_update_timestamp: 0,
        last_proof_timestamp: 0,
        price_units: 0,
        is_paused: false,
        bump: 255,
    }
}

pub fn serials(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("W3B-{i:06}")).collect()
}

/// Fast settings: no debounce, 1ms confirmation polling.
pub fn reserve_settings() -> ReserveSettings {
    ReserveSettings {
        state_address: state_address(),
        auto_mint: true,
        allow_reserve_decrease: false,
        debounce: Duration::ZERO,
        run_timeout: Duration::from_secs(5),
        confirm_poll: Duration::from_millis(1),
        confirm_max_polls: 5,
    }
}

pub fn price_settings() -> PriceSettings {
    PriceSettings {
        state_address: state_address(),
        policy: PricePolicy::default(),
        confirm_poll: Duration::from_millis(1),
        confirm_max_polls: 5,
    }
}

/// One ledger, one audit table, one program.
pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub audit: Arc<FakeAuditStore>,
    pub program: Arc<FakeProgram>,
    pub settings: ReserveSettings,
}

impl Harness {
    pub fn new<S: AsRef<str>>(serials: &[S], state: ProtocolStateSnapshot) -> Self {
        Self {
            ledger: Arc::new(FakeLedger::with_serials(serials)),
            audit: Arc::new(FakeAuditStore::new()),
            program: Arc::new(FakeProgram::new(state_address(), state)),
            settings: reserve_settings(),
        }
    }

    pub fn without_account<S: AsRef<str>>(serials: &[S]) -> Self {
        Self {
            ledger: Arc::new(FakeLedger::with_serials(serials)),
            audit: Arc::new(FakeAuditStore::new()),
            program: Arc::new(FakeProgram::missing(state_address())),
            settings: reserve_settings(),
        }
    }

    pub fn reserve(&self) -> ReserveReconciler {
        ReserveReconciler::new(
            self.ledger.clone(),
            self.audit.clone(),
            self.program.clone(),
            self.settings.clone(),
        )
    }

    pub fn price(&self, source: Arc<FixedPriceSource>) -> PriceReconciler {
        PriceReconciler::new(self.program.clone(), source, price_settings())
    }
}
