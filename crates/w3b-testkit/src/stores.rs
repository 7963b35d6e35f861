//! In-memory ledger, audit table and price feed.
//!
//! Semantics mirror the Postgres implementation: serials come back in byte
//! order, stamping only fills empty stamps within the given set, and audit
//! upserts never move status backwards or erase a signature.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use w3b_runtime::{AuditStore, DataSourceError, LedgerStore, PriceSource, PriceSourceError};
use w3b_schemas::CommitmentAuditEntry;

#[derive(Default)]
struct LedgerInner {
    /// serial -> stamped root
    rows: BTreeMap<String, Option<String>>,
    read_error: Option<String>,
    stamp_error: Option<String>,
    read_delay: Duration,
    reads: usize,
}

#[derive(Default)]
pub struct FakeLedger {
    inner: Mutex<LedgerInner>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serials<S: AsRef<str>>(serials: &[S]) -> Self {
        let ledger = Self::new();
        for s in serials {
            ledger.insert(s.as_ref());
        }
        ledger
    }

    /// `false` if the serial already exists.
    pub fn insert(&self, serial: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.rows.contains_key(serial) {
            return false;
        }
        inner.rows.insert(serial.to_string(), None);
        true
    }

    pub fn remove(&self, serial: &str) {
        self.inner.lock().unwrap().rows.remove(serial);
    }

    pub fn stamp_of(&self, serial: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(serial)
            .cloned()
            .flatten()
    }

    pub fn fail_reads(&self, reason: &str) {
        self.inner.lock().unwrap().read_error = Some(reason.to_string());
    }

    pub fn fail_stamping(&self, reason: &str) {
        self.inner.lock().unwrap().stamp_error = Some(reason.to_string());
    }

    /// Make every read take at least `delay`.
    pub fn slow_reads(&self, delay: Duration) {
        self.inner.lock().unwrap().read_delay = delay;
    }

    pub fn read_count(&self) -> usize {
        self.inner.lock().unwrap().reads
    }
}

#[async_trait::async_trait]
impl LedgerStore for FakeLedger {
    async fn fetch_serial_numbers(&self) -> Result<Vec<String>, DataSourceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.reads += 1;
            inner.read_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.read_error {
            return Err(DataSourceError(reason.clone()));
        }
        Ok(inner.rows.keys().cloned().collect())
    }

    async fn stamp_unreconciled(
        &self,
        root_hex: &str,
        serials: &[String],
    ) -> Result<u64, DataSourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.stamp_error {
            return Err(DataSourceError(reason.clone()));
        }
        let mut touched = 0;
        for serial in serials {
            match inner.rows.get_mut(serial) {
                Some(stamp) if stamp.is_none() => {
                    *stamp = Some(root_hex.to_string());
                    touched += 1;
                }
                _ => {}
            }
        }
        Ok(touched)
    }
}

#[derive(Default)]
struct AuditInner {
    rows: BTreeMap<String, CommitmentAuditEntry>,
    write_error: Option<String>,
    writes: usize,
}

#[derive(Default)]
pub struct FakeAuditStore {
    inner: Mutex<AuditInner>,
}

impl FakeAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root_hex: &str) -> Option<CommitmentAuditEntry> {
        self.inner.lock().unwrap().rows.get(root_hex).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn fail_writes(&self, reason: &str) {
        self.inner.lock().unwrap().write_error = Some(reason.to_string());
    }
}

#[async_trait::async_trait]
impl AuditStore for FakeAuditStore {
    async fn upsert_commitment_audit(
        &self,
        entry: &CommitmentAuditEntry,
    ) -> Result<(), DataSourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.write_error {
            return Err(DataSourceError(reason.clone()));
        }
        inner.writes += 1;
        inner
            .rows
            .entry(entry.root_hash.clone())
            .and_modify(|row| {
                row.total_serials = entry.total_serials;
                row.status = row.status.max(entry.status);
                if entry.on_chain_tx_signature.is_some() {
                    row.on_chain_tx_signature = entry.on_chain_tx_signature.clone();
                }
            })
            .or_insert_with(|| entry.clone());
        Ok(())
    }
}

/// Price feed returning a scripted value.
pub struct FixedPriceSource {
    value: Mutex<Result<u64, PriceSourceError>>,
    calls: Mutex<usize>,
}

impl FixedPriceSource {
    pub fn new(price: u64) -> Self {
        Self {
            value: Mutex::new(Ok(price)),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(err: PriceSourceError) -> Self {
        Self {
            value: Mutex::new(Err(err)),
            calls: Mutex::new(0),
        }
    }

    pub fn set(&self, price: u64) {
        *self.value.lock().unwrap() = Ok(price);
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl PriceSource for FixedPriceSource {
    fn source_name(&self) -> &str {
        "fixed"
    }

    async fn candidate_price(&self) -> Result<u64, PriceSourceError> {
        *self.calls.lock().unwrap() += 1;
        self.value.lock().unwrap().clone()
    }
}
