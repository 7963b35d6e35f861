//! In-memory ledger program.
//!
//! Holds the protocol state as an encoded V2 account and applies submitted
//! instructions with the same acceptance rules as the deployed program:
//! - `update_merkle_root`, `mint_w3b` and `set_w3b_price` refuse while paused
//! - `update_merkle_root` accepts any reserve count, including one below
//!   supply; the reconciler's guard is the only check against that
//! - `submit_proof` ignores the pause flag and must claim exactly the
//!   on-chain proven reserves
//! - `mint_w3b` needs a receipt newer than the last publish and younger
//!   than 48h, and may not take supply above reserves
//! - `set_w3b_price` must be positive and move at most 20% from the current
//!   price
//!
//! A rejected instruction still gets a signature; its status is `Failed`.
//! That is how a landed-but-reverted transaction looks to the client.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use w3b_chain::{ChainError, ChainRpc, Instruction, LayoutV2, SignatureStatus, TxSignature};
use w3b_reconcile::PROOF_VALIDITY_SECS;
use w3b_schemas::{Address, ProtocolStateSnapshot};

/// Largest single price move the program accepts, in bps.
pub const MAX_PRICE_SWING_BPS: u64 = 2_000;

/// How an injected failure surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// The relay refuses the submit outright.
    Rejected(String),
    /// The transaction lands and reverts.
    Reverted(String),
    /// The transaction never reaches confirmation.
    NeverConfirms,
}

#[derive(Default)]
struct Inner {
    account: Option<Vec<u8>>,
    read_error: Option<String>,
    failures: HashMap<&'static str, InjectedFailure>,
    statuses: HashMap<String, SignatureStatus>,
    journal: Vec<Instruction>,
    reads: usize,
    clock_offset_secs: i64,
    next_sig: u64,
}

pub struct FakeProgram {
    address: Address,
    inner: Mutex<Inner>,
}

impl FakeProgram {
    pub fn new(address: Address, state: ProtocolStateSnapshot) -> Self {
        let inner = Inner {
            account: Some(LayoutV2::encode(&state)),
            ..Inner::default()
        };
        Self {
            address,
            inner: Mutex::new(inner),
        }
    }

    /// No account at `address`.
    pub fn missing(address: Address) -> Self {
        Self {
            address,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Current state, decoded. Panics if the account is absent or not V2.
    pub fn state(&self) -> ProtocolStateSnapshot {
        let inner = self.inner.lock().unwrap();
        let raw = inner.account.as_ref().expect("account exists");
        w3b_chain::StateLayout::decode(&LayoutV2, raw).expect("V2 account")
    }

    pub fn set_state(&self, state: ProtocolStateSnapshot) {
        self.inner.lock().unwrap().account = Some(LayoutV2::encode(&state));
    }

    /// Replace the account bytes verbatim (legacy or corrupt layouts).
    pub fn set_raw_account(&self, data: Vec<u8>) {
        self.inner.lock().unwrap().account = Some(data);
    }

    pub fn fail_reads(&self, reason: &str) {
        self.inner.lock().unwrap().read_error = Some(reason.to_string());
    }

    /// Fail every future submit of the instruction with this program name.
    pub fn fail_instruction(&self, program_name: &'static str, failure: InjectedFailure) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(program_name, failure);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    /// Shift the program clock, e.g. to age a proof receipt.
    pub fn advance_clock(&self, secs: i64) {
        self.inner.lock().unwrap().clock_offset_secs += secs;
    }

    pub fn now(&self) -> i64 {
        Utc::now().timestamp() + self.inner.lock().unwrap().clock_offset_secs
    }

    /// Every submit that reached the program, in order, including failures.
    pub fn journal(&self) -> Vec<Instruction> {
        self.inner.lock().unwrap().journal.clone()
    }

    pub fn submitted_names(&self) -> Vec<&'static str> {
        self.journal().iter().map(Instruction::program_name).collect()
    }

    pub fn submit_count(&self) -> usize {
        self.inner.lock().unwrap().journal.len()
    }

    pub fn read_count(&self) -> usize {
        self.inner.lock().unwrap().reads
    }

    fn apply(
        state: &mut ProtocolStateSnapshot,
        instruction: &Instruction,
        now: i64,
    ) -> Result<(), String> {
        let pausable = !matches!(instruction, Instruction::RecordProof { .. });
        if pausable && state.is_paused {
            return Err("ProtocolPaused".into());
        }
        match instruction {
            Instruction::PublishCommitment {
                root,
                total_serials,
            } => {
                state.current_commitment_root = *root;
                state.proven_reserves = *total_serials;
                state.last_update_timestamp = now;
            }
            Instruction::RecordProof {
                claimed_reserves, ..
            } => {
                if *claimed_reserves != state.proven_reserves {
                    return Err("ReserveMismatch".into());
                }
                state.last_proof_timestamp = now;
            }
            Instruction::Mint { amount } => {
                if *amount == 0 {
                    return Err("ZeroAmount".into());
                }
                if !state.proof_is_current() || now - state.last_proof_timestamp >= PROOF_VALIDITY_SECS {
                    return Err("StaleProof".into());
                }
                let new_supply = state
                    .total_supply
                    .checked_add(*amount)
                    .ok_or_else(|| "Overflow".to_string())?;
                if new_supply > state.proven_reserves {
                    return Err("InsufficientReserves".into());
                }
                state.total_supply = new_supply;
            }
            Instruction::SetPrice { price_units } => {
                if *price_units == 0 {
                    return Err("InvalidPrice".into());
                }
                let current = state.price_units;
                if current > 0
                    && u128::from(current.abs_diff(*price_units)) * 10_000
                        > u128::from(MAX_PRICE_SWING_BPS) * u128::from(current)
                {
                    return Err("PriceChangeTooLarge".into());
                }
                state.price_units = *price_units;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChainRpc for FakeProgram {
    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads += 1;
        if let Some(reason) = &inner.read_error {
            return Err(ChainError::Transport(reason.clone()));
        }
        if *address != self.address {
            return Ok(None);
        }
        Ok(inner.account.clone())
    }

    async fn submit(&self, instruction: &Instruction) -> Result<TxSignature, ChainError> {
        let now = self.now();
        let mut inner = self.inner.lock().unwrap();
        inner.journal.push(instruction.clone());
        let name = instruction.program_name();

        if let Some(InjectedFailure::Rejected(reason)) = inner.failures.get(name) {
            return Err(ChainError::Rejected {
                instruction: name.to_string(),
                reason: reason.clone(),
            });
        }

        inner.next_sig += 1;
        let sig = TxSignature(format!("fake-sig-{:04}-{name}", inner.next_sig));

        let status = match inner.failures.get(name).cloned() {
            Some(InjectedFailure::Reverted(reason)) => SignatureStatus::Failed(reason),
            Some(InjectedFailure::NeverConfirms) => SignatureStatus::Pending,
            _ => {
                let outcome = match inner.account.as_ref() {
                    None => Err("AccountNotInitialized".to_string()),
                    Some(raw) => w3b_chain::StateLayout::decode(&LayoutV2, raw)
                        .map_err(|e| e.to_string())
                        .and_then(|mut state| {
                            Self::apply(&mut state, instruction, now).map(|()| state)
                        }),
                };
                match outcome {
                    Ok(state) => {
                        inner.account = Some(LayoutV2::encode(&state));
                        SignatureStatus::Confirmed
                    }
                    Err(reason) => SignatureStatus::Failed(reason),
                }
            }
        };
        inner.statuses.insert(sig.0.clone(), status);
        Ok(sig)
    }

    async fn signature_status(&self, signature: &TxSignature) -> Result<SignatureStatus, ChainError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .statuses
            .get(&signature.0)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }
}
