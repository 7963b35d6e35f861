//! Ledger RPC boundary.
//!
//! `ChainRpc` is the seam between the orchestrator and the network. The HTTP
//! implementation lives in [`crate::http`]; tests use in-memory programs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use w3b_schemas::{Address, ProtocolStateSnapshot};

use crate::instruction::Instruction;
use crate::layout::{LayoutError, LayoutV2, StateLayout};

/// Transaction identifier returned by a submit, usable for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet seen or not yet at the required commitment level.
    Pending,
    Confirmed,
    /// Landed but the program returned an error.
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("account {0} not found")]
    AccountNotFound(Address),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("relay error ({status}): {message}")]
    Relay { status: u16, message: String },

    #[error("relay rejected credentials: {0}")]
    Unauthorized(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("instruction {instruction} rejected by program: {reason}")]
    Rejected { instruction: String, reason: String },

    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("transaction {signature} unconfirmed after {polls} polls")]
    Unconfirmed { signature: String, polls: u32 },
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// Raw account bytes, or `None` if the account does not exist.
    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, ChainError>;

    /// Sign and submit one instruction.
    async fn submit(&self, instruction: &Instruction) -> Result<TxSignature, ChainError>;

    async fn signature_status(&self, signature: &TxSignature) -> Result<SignatureStatus, ChainError>;
}

/// Fetch and decode the protocol state account with the current layout.
///
/// A missing account is `AccountNotFound`, never a zeroed snapshot.
pub async fn read_state(
    rpc: &dyn ChainRpc,
    address: &Address,
) -> Result<ProtocolStateSnapshot, ChainError> {
    let data = rpc
        .get_account_data(address)
        .await?
        .ok_or(ChainError::AccountNotFound(*address))?;
    Ok(LayoutV2.decode(&data)?)
}

/// Poll until `signature` is confirmed, failed, or `max_polls` runs out.
pub async fn await_confirmation(
    rpc: &dyn ChainRpc,
    signature: &TxSignature,
    poll_every: Duration,
    max_polls: u32,
) -> Result<(), ChainError> {
    for attempt in 1..=max_polls {
        match rpc.signature_status(signature).await? {
            SignatureStatus::Confirmed => {
                debug!(%signature, attempt, "signature confirmed");
                return Ok(());
            }
            SignatureStatus::Failed(reason) => {
                return Err(ChainError::TransactionFailed {
                    signature: signature.0.clone(),
                    reason,
                });
            }
            SignatureStatus::Pending => {
                if attempt < max_polls {
                    tokio::time::sleep(poll_every).await;
                }
            }
        }
    }
    Err(ChainError::Unconfirmed {
        signature: signature.0.clone(),
        polls: max_polls,
    })
}
