//! Run reports and per-run log lines.
//!
//! Reports are the operational signal for unattended triggers: every failure
//! ends up here as data, never as a panic or a bare error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use w3b_reconcile::{PriceDecision, SkipReason, StepKind};
use w3b_schemas::SnapshotSummary;

use crate::error::{ErrorKind, PipelineError};
use crate::trigger::TriggerSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Empty ledger; no chain calls made.
    NothingToVerify,
    /// Every step confirmed or already in place.
    Reconciled,
    /// At least one step landed, a later one failed. The next run resumes.
    PartiallyApplied,
    /// The guard refused; no chain mutation.
    Refused,
    /// Aborted before any chain mutation landed.
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::NothingToVerify => "NOTHING_TO_VERIFY",
            RunOutcome::Reconciled => "RECONCILED",
            RunOutcome::PartiallyApplied => "PARTIALLY_APPLIED",
            RunOutcome::Refused => "REFUSED",
            RunOutcome::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Confirmed,
    Skipped,
    Failed,
    NotAttempted,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Confirmed => "CONFIRMED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Failed => "FAILED",
            StepStatus::NotAttempted => "NOT_ATTEMPTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepKind,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Instruction argument: serial count, claimed reserves or mint amount.
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for ReportError {
    fn from(e: &PipelineError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    pub success: bool,
    pub outcome: RunOutcome,
    pub log: Vec<String>,
    pub root_hex: Option<String>,
    pub leaf_count: Option<u64>,
    pub steps: Vec<StepRecord>,
    pub before: Option<SnapshotSummary>,
    pub after: Option<SnapshotSummary>,
    /// `supply <= proven_reserves && proven_reserves == leaf_count` on the
    /// post-run snapshot. `None` when no post-run read happened.
    pub post_invariant_holds: Option<bool>,
    pub error: Option<ReportError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn step(&self, kind: StepKind) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == kind)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceReport {
    pub run_id: Uuid,
    pub success: bool,
    pub on_chain_price: Option<u64>,
    pub candidate_price: Option<u64>,
    pub decision: Option<PriceDecision>,
    pub signature: Option<String>,
    pub log: Vec<String>,
    pub error: Option<ReportError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogLine {
    pub run_id: Uuid,
    pub level: LogLevel,
    pub message: String,
}

/// Observer for log lines as they are written (the daemon forwards them to
/// its event stream).
pub type LogTap = Arc<dyn Fn(&RunLogLine) + Send + Sync>;

/// Human-readable lines for one run, mirrored into `tracing`.
pub struct RunLog {
    run_id: Uuid,
    lines: Vec<String>,
    tap: Option<LogTap>,
}

impl RunLog {
    pub fn new(run_id: Uuid, tap: Option<LogTap>) -> Self {
        Self {
            run_id,
            lines: Vec::new(),
            tap,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(run_id = %self.run_id, "{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = %self.run_id, "{message}");
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(run_id = %self.run_id, "{message}");
        self.push(LogLevel::Error, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        let line = match level {
            LogLevel::Info => message.clone(),
            LogLevel::Warn => format!("WARN: {message}"),
            LogLevel::Error => format!("ERROR: {message}"),
        };
        if let Some(tap) = &self.tap {
            tap(&RunLogLine {
                run_id: self.run_id,
                level,
                message,
            });
        }
        self.lines.push(line);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn levels_prefix_lines_and_reach_the_tap() {
        let seen: Arc<Mutex<Vec<RunLogLine>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tap: LogTap = Arc::new(move |l: &RunLogLine| sink.lock().unwrap().push(l.clone()));

        let mut log = RunLog::new(Uuid::nil(), Some(tap));
        log.info("reading ledger");
        log.warn("audit write failed");
        log.error("post-run invariant violated");

        assert_eq!(
            log.into_lines(),
            vec![
                "reading ledger".to_string(),
                "WARN: audit write failed".to_string(),
                "ERROR: post-run invariant violated".to_string(),
            ]
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].level, LogLevel::Warn);
        assert_eq!(seen[1].message, "audit write failed");
    }
}
