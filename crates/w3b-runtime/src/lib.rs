//! w3b-runtime
//!
//! Orchestration for the two reconcilers:
//! - `reserve`: ledger -> commitment -> guard -> on-chain sequence -> audit
//! - `price`: on-chain price vs. external candidate
//!
//! Both runners return reports, never errors. Stores and the chain are
//! injected as trait objects so the same runners back the daemon, the CLI
//! and the in-memory scenario tests.

pub mod error;
pub mod price;
pub mod report;
pub mod reserve;
pub mod stores;
pub mod trigger;

pub use error::{DataSourceError, ErrorKind, PipelineError, PriceSourceError};
pub use price::{PriceReconciler, PriceSettings};
pub use report::{
    LogLevel, LogTap, PriceReport, ReconciliationReport, ReportError, RunLog, RunLogLine,
    RunOutcome, StepRecord, StepStatus,
};
pub use reserve::{ReserveReconciler, ReserveSettings};
pub use stores::{AuditStore, HttpPriceSource, LedgerStore, PgStore, PriceSource};
pub use trigger::{ReconciliationRequest, TriggerInput, TriggerSource};
