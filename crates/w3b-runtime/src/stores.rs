//! Off-chain store and price source boundaries.

use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;
use w3b_schemas::CommitmentAuditEntry;

use crate::error::{DataSourceError, PriceSourceError};

/// Read side of the serial ledger plus the stamping write.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Complete serial set, ascending by byte value.
    async fn fetch_serial_numbers(&self) -> Result<Vec<String>, DataSourceError>;

    /// Stamp unstamped rows among `serials` with `root_hex`; returns rows touched.
    async fn stamp_unreconciled(
        &self,
        root_hex: &str,
        serials: &[String],
    ) -> Result<u64, DataSourceError>;
}

#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Idempotent on `entry.root_hash`.
    async fn upsert_commitment_audit(
        &self,
        entry: &CommitmentAuditEntry,
    ) -> Result<(), DataSourceError>;
}

/// Off-chain rate feed for the price reconciler.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// Candidate price in on-chain units.
    async fn candidate_price(&self) -> Result<u64, PriceSourceError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Both store traits over one Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgStore {
    async fn fetch_serial_numbers(&self) -> Result<Vec<String>, DataSourceError> {
        Ok(w3b_db::fetch_serial_numbers(&self.pool).await?)
    }

    async fn stamp_unreconciled(
        &self,
        root_hex: &str,
        serials: &[String],
    ) -> Result<u64, DataSourceError> {
        Ok(w3b_db::stamp_unreconciled_serials(&self.pool, root_hex, serials).await?)
    }
}

#[async_trait::async_trait]
impl AuditStore for PgStore {
    async fn upsert_commitment_audit(
        &self,
        entry: &CommitmentAuditEntry,
    ) -> Result<(), DataSourceError> {
        Ok(w3b_db::upsert_commitment_audit(&self.pool, entry).await?)
    }
}

// ---------------------------------------------------------------------------
// HTTP price source
// ---------------------------------------------------------------------------

/// Reads a numeric rate from a JSON endpoint and scales it to on-chain units.
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    http: reqwest::Client,
    url: String,
    pointer: String,
    units_scale: u64,
}

impl HttpPriceSource {
    pub fn new(
        url: &str,
        pointer: &str,
        units_scale: u64,
        timeout: Duration,
    ) -> Result<Self, PriceSourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceSourceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
            pointer: pointer.to_string(),
            units_scale,
        })
    }
}

#[async_trait::async_trait]
impl PriceSource for HttpPriceSource {
    fn source_name(&self) -> &str {
        &self.url
    }

    async fn candidate_price(&self) -> Result<u64, PriceSourceError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PriceSourceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PriceSourceError::Transport(format!(
                "http status {}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| PriceSourceError::Decode(e.to_string()))?;

        let raw = body
            .pointer(&self.pointer)
            .ok_or_else(|| PriceSourceError::Decode(format!("no value at {}", self.pointer)))?;
        let rate = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| PriceSourceError::Decode(format!("value at {} is not numeric", self.pointer)))?;

        let scaled = (rate * self.units_scale as f64).round();
        if !scaled.is_finite() || scaled <= 0.0 {
            return Err(PriceSourceError::NonPositive(rate));
        }
        if scaled >= u64::MAX as f64 {
            return Err(PriceSourceError::Decode(format!("rate {rate} overflows price units")));
        }
        Ok(scaled as u64)
    }
}
