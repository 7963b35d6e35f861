//! Request and response types for the w3b-daemon HTTP endpoints.
//!
//! No business logic lives here. Reconciliation and price reports are
//! returned as-is from `w3b-runtime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use w3b_runtime::{PriceReport, ReconciliationReport};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error body for refusals that never reached a runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Either kind of run report, tagged for `/v1/reports/last` and SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum AnyReport {
    Reserve(ReconciliationReport),
    Price(PriceReport),
}

impl AnyReport {
    pub fn summary(&self) -> ReportSummary {
        match self {
            AnyReport::Reserve(r) => ReportSummary {
                report: "reserve",
                run_id: r.run_id,
                success: r.success,
                detail: r.outcome.as_str().to_string(),
                finished_at: r.finished_at,
            },
            AnyReport::Price(r) => ReportSummary {
                report: "price",
                run_id: r.run_id,
                success: r.success,
                detail: r
                    .error
                    .as_ref()
                    .map(|e| e.kind.as_str().to_string())
                    .unwrap_or_else(|| "OK".to_string()),
                finished_at: r.finished_at,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// "reserve" | "price"
    pub report: &'static str,
    pub run_id: Uuid,
    pub success: bool,
    /// Run outcome for reserve runs, error kind (or "OK") for price runs.
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}
