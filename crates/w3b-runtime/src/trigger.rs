//! Trigger payloads, normalised once at the boundary.

use serde::{Deserialize, Serialize};

/// Raw trigger body as received by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerInput {
    /// Batch-insert notification from the ingestion side.
    Webhook {
        event: String,
        #[serde(default)]
        batch_id: Option<String>,
        #[serde(default)]
        inserted: Option<u64>,
    },
    /// Operator-initiated run. Signature verification happens upstream.
    ManualAction {
        operator: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        allow_reserve_decrease: bool,
        #[serde(default)]
        disable_mint: bool,
    },
}

/// Who asked for a run. Carried into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Webhook {
        event: String,
        batch_id: Option<String>,
    },
    Manual {
        operator: String,
    },
    Cli,
}

impl TriggerSource {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Webhook { .. } => "webhook",
            TriggerSource::Manual { .. } => "manual",
            TriggerSource::Cli => "cli",
        }
    }
}

/// The single request type the pipeline operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRequest {
    pub source: TriggerSource,
    pub allow_reserve_decrease: bool,
    pub disable_mint: bool,
    /// Wait the configured debounce before reading the ledger.
    pub debounce: bool,
}

impl ReconciliationRequest {
    pub fn scheduled() -> Self {
        Self {
            source: TriggerSource::Scheduled,
            allow_reserve_decrease: false,
            disable_mint: false,
            debounce: false,
        }
    }

    pub fn cli(allow_reserve_decrease: bool, disable_mint: bool) -> Self {
        Self {
            source: TriggerSource::Cli,
            allow_reserve_decrease,
            disable_mint,
            debounce: false,
        }
    }
}

impl From<TriggerInput> for ReconciliationRequest {
    fn from(input: TriggerInput) -> Self {
        match input {
            TriggerInput::Webhook {
                event, batch_id, ..
            } => Self {
                source: TriggerSource::Webhook { event, batch_id },
                allow_reserve_decrease: false,
                disable_mint: false,
                debounce: true,
            },
            TriggerInput::ManualAction {
                operator,
                allow_reserve_decrease,
                disable_mint,
                ..
            } => Self {
                source: TriggerSource::Manual { operator },
                allow_reserve_decrease,
                disable_mint,
                debounce: false,
            },
        }
    }
}
