use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use w3b_chain::{ChainError, LayoutError};
use w3b_commitment::CommitmentError;
use w3b_reconcile::{GuardRefusal, PriceRejection, StepKind};
use w3b_schemas::Address;

/// Off-chain store failure. Safe to retry; never retried locally.
#[derive(Debug, Clone, Error)]
#[error("data source error: {0}")]
pub struct DataSourceError(pub String);

impl From<anyhow::Error> for DataSourceError {
    fn from(e: anyhow::Error) -> Self {
        DataSourceError(format!("{e:#}"))
    }
}

#[derive(Debug, Clone, Error)]
pub enum PriceSourceError {
    #[error("price source request failed: {0}")]
    Transport(String),
    #[error("price source response malformed: {0}")]
    Decode(String),
    #[error("price source returned a non-positive rate: {0}")]
    NonPositive(f64),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("protocol state account {0} not found: no safety baseline, refusing to publish")]
    AccountNotFound(Address),

    #[error("protocol state could not be read: {0}")]
    ChainRead(ChainError),

    #[error("protocol state layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("serial set rejected: {0}")]
    Commitment(#[from] CommitmentError),

    #[error(transparent)]
    Guard(GuardRefusal),

    #[error("step {} failed: {source}", .step.as_str())]
    Transaction {
        step: StepKind,
        #[source]
        source: ChainError,
    },

    #[error("run exceeded {0:?} before any on-chain mutation")]
    Timeout(Duration),

    #[error(transparent)]
    PriceSource(PriceSourceError),

    #[error("price rejected: {0}")]
    PriceRejected(String),

    #[error("price publish failed: {0}")]
    PriceTransaction(ChainError),
}

impl From<PriceRejection> for PipelineError {
    fn from(r: PriceRejection) -> Self {
        PipelineError::PriceRejected(r.to_string())
    }
}

/// Stable error category carried in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DataSource,
    AccountNotFound,
    Layout,
    InvariantViolation,
    Transaction,
    Timeout,
    PriceSource,
    PriceRejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DataSource => "DATA_SOURCE",
            ErrorKind::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorKind::Layout => "LAYOUT",
            ErrorKind::InvariantViolation => "INVARIANT_VIOLATION",
            ErrorKind::Transaction => "TRANSACTION",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::PriceSource => "PRICE_SOURCE",
            ErrorKind::PriceRejected => "PRICE_REJECTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // A chain read transport failure is retryable like a store outage.
            PipelineError::DataSource(_) | PipelineError::ChainRead(_) => ErrorKind::DataSource,
            PipelineError::Commitment(_) => ErrorKind::DataSource,
            PipelineError::AccountNotFound(_) => ErrorKind::AccountNotFound,
            PipelineError::Layout(_) => ErrorKind::Layout,
            PipelineError::Guard(_) => ErrorKind::InvariantViolation,
            PipelineError::Transaction { .. } | PipelineError::PriceTransaction(_) => {
                ErrorKind::Transaction
            }
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::PriceSource(PriceSourceError::NonPositive(_)) => ErrorKind::PriceRejected,
            PipelineError::PriceSource(_) => ErrorKind::PriceSource,
            PipelineError::PriceRejected(_) => ErrorKind::PriceRejected,
        }
    }
}
