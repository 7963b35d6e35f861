//! Shared data model for the reserve reconciler.
//!
//! Plain serde types only. Decoding of on-chain bytes lives in `w3b-chain`,
//! persistence in `w3b-db`; nothing here performs IO.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 32-byte ledger account address, rendered as base58.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Copy 32 bytes out of `slice`. Returns `None` on any other length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Parse failure for a base58 address string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAddress(pub String);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid base58 address '{}'", self.0)
    }
}

impl std::error::Error for InvalidAddress {}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = bs58::decode(s.trim())
            .into_vec()
            .map_err(|_| InvalidAddress(s.to_string()))?;
        Address::from_slice(&raw).ok_or_else(|| InvalidAddress(s.to_string()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// serde adapter: `[u8; 32]` as lowercase hex.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.trim()).map_err(serde::de::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes of hex"))
    }
}

// ---------------------------------------------------------------------------
// Off-chain ledger rows
// ---------------------------------------------------------------------------

/// One physical reserve unit in the off-chain ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialRecord {
    /// Unique key.
    pub serial_number: String,
    pub batch_id: String,
    /// Hex root of the commitment this serial was folded into, once stamped.
    pub included_in_commitment: Option<String>,
}

/// Progress of a published commitment through the on-chain sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Root + leaf count are on-chain; attestation not yet recorded.
    Published,
    /// Proof receipt recorded; mint not (yet) performed.
    Attested,
    /// Every step the run needed has landed.
    Complete,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Published => "PUBLISHED",
            AuditStatus::Attested => "ATTESTED",
            AuditStatus::Complete => "COMPLETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PUBLISHED" => Some(AuditStatus::Published),
            "ATTESTED" => Some(AuditStatus::Attested),
            "COMPLETE" => Some(AuditStatus::Complete),
            _ => None,
        }
    }
}

/// Off-chain audit row, unique on `root_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentAuditEntry {
    /// Hex-encoded 32-byte commitment root.
    pub root_hash: String,
    pub total_serials: u64,
    /// Signature of the publish-commitment transaction; `None` when the root
    /// was already on-chain before this run.
    pub on_chain_tx_signature: Option<String>,
    pub status: AuditStatus,
}

// ---------------------------------------------------------------------------
// On-chain protocol state
// ---------------------------------------------------------------------------

/// Decoded point-in-time read of the protocol state account.
///
/// Immutable once read. Take a fresh one before and after every mutating
/// sequence; on-chain state may move between reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStateSnapshot {
    pub layout_version: u8,
    pub authority: Address,
    pub operator: Address,
    pub mint_address: Address,
    pub treasury_address: Address,
    pub total_supply: u64,
    pub total_burned: u64,
    #[serde(with = "hex32")]
    pub current_commitment_root: [u8; 32],
    pub proven_reserves: u64,
    /// Unix seconds of the last root publish.
    pub last_update_timestamp: i64,
    /// Unix seconds of the last proof receipt.
    pub last_proof_timestamp: i64,
    pub price_units: u64,
    pub is_paused: bool,
    /// PDA bump seed. Never zero on a remapped V2 account.
    #[serde(default)]
    pub bump: u8,
}

impl ProtocolStateSnapshot {
    pub fn root_hex(&self) -> String {
        hex::encode(self.current_commitment_root)
    }

    /// `total_supply <= proven_reserves`.
    pub fn is_solvent(&self) -> bool {
        self.total_supply <= self.proven_reserves
    }

    /// The proof receipt is at least as recent as the last root publish.
    pub fn proof_is_current(&self) -> bool {
        self.last_proof_timestamp >= self.last_update_timestamp
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary::from(self)
    }
}

/// Compact snapshot view carried in run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub total_supply: u64,
    pub proven_reserves: u64,
    pub commitment_root: String,
    pub last_update_timestamp: i64,
    pub price_units: u64,
    pub is_paused: bool,
}

impl From<&ProtocolStateSnapshot> for SnapshotSummary {
    fn from(s: &ProtocolStateSnapshot) -> Self {
        Self {
            total_supply: s.total_supply,
            proven_reserves: s.proven_reserves,
            commitment_root: s.root_hex(),
            last_update_timestamp: s.last_update_timestamp,
            price_units: s.price_units,
            is_paused: s.is_paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_base58() {
        let a = Address::new([7u8; 32]);
        let s = a.to_string();
        let b: Address = s.parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_rejects_wrong_length() {
        let short = bs58::encode([1u8; 20]).into_string();
        assert!(short.parse::<Address>().is_err());
        assert!("not-base58-0OIl".parse::<Address>().is_err());
    }

    #[test]
    fn audit_status_parse_matches_as_str() {
        for s in [AuditStatus::Published, AuditStatus::Attested, AuditStatus::Complete] {
            assert_eq!(AuditStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(AuditStatus::parse("DONE"), None);
    }

    #[test]
    fn snapshot_serializes_root_as_hex() {
        let snap = ProtocolStateSnapshot {
            layout_version: 2,
            authority: Address::default(),
            operator: Address::default(),
            mint_address: Address::default(),
            treasury_address: Address::default(),
            total_supply: 2,
            total_burned: 0,
            current_commitment_root: [0xab; 32],
            proven_reserves: 3,
            last_update_timestamp: 10,
            last_proof_timestamp: 9,
            price_units: 1000,
            is_paused: false,
            bump: 255,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["current_commitment_root"], "ab".repeat(32));
        assert!(snap.is_solvent());
        assert!(!snap.proof_is_current());

        let back: ProtocolStateSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
