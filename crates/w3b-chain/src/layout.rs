//! Protocol state account decoding.
//!
//! One decoder type per on-chain schema version. Decoding is byte slicing plus
//! little-endian integer parsing; no business rules live here.
//!
//! V2 layout (after the 8-byte account discriminator):
//!
//! | Offset   | Field                   | Type     |
//! |----------|-------------------------|----------|
//! | 8..40    | authority               | [u8; 32] |
//! | 40..72   | operator                | [u8; 32] |
//! | 72..104  | mint                    | [u8; 32] |
//! | 104..136 | treasury                | [u8; 32] |
//! | 136..144 | total_supply            | u64      |
//! | 144..152 | total_burned            | u64      |
//! | 152..184 | merkle_root             | [u8; 32] |
//! | 184..192 | proven_reserves         | u64      |
//! | 192..200 | last_root_update        | i64      |
//! | 200..208 | last_proof_timestamp    | i64      |
//! | 208..216 | price_units             | u64      |
//! | 216..248 | sol_receiver            | [u8; 32] |
//! | 248..250 | yield_apy_bps           | u16      |
//! | 250..258 | total_yield_distributed | u64      |
//! | 258..266 | last_yield_distribution | i64      |
//! | 266      | is_paused               | u8       |
//! | 267      | bump                    | u8       |

use sha2::{Digest, Sha256};
use thiserror::Error;
use w3b_schemas::{Address, ProtocolStateSnapshot};

/// Bytes allocated for the account on-chain (discriminator + padded body).
pub const ACCOUNT_SPACE: usize = 8 + 512;

const DISCRIMINATOR_LEN: usize = 8;

/// Legacy V1 accounts were allocated in this length range.
const LEGACY_MIN_LEN: usize = 210;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("account data too short: {len} bytes, layout needs at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("account is {len} bytes, matching the legacy V1 layout; migration required")]
    LegacyLayout { len: usize },

    #[error("account discriminator mismatch: found {found}, expected {expected}")]
    DiscriminatorMismatch { found: String, expected: String },

    /// V2-sized but still holding V1 field offsets: resized without the
    /// follow-up remap.
    #[error("account is V2-sized but not remapped to the V2 layout ({reason}); layout fix required")]
    NotRemapped { reason: String },
}

/// Anchor account discriminator: `sha256("account:<Name>")[..8]`.
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("account:{name}").as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// A decoder for one schema version of the protocol state account.
pub trait StateLayout {
    fn version(&self) -> u8;

    fn min_len(&self) -> usize;

    fn decode(&self, data: &[u8]) -> Result<ProtocolStateSnapshot, LayoutError>;
}

/// Current steady-state layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutV2;

impl LayoutV2 {
    pub const VERSION: u8 = 2;
    pub const MIN_LEN: usize = 268;

    /// Serialise a snapshot into a full-size V2 account buffer. Fields the
    /// snapshot does not carry are written as zero.
    pub fn encode(snapshot: &ProtocolStateSnapshot) -> Vec<u8> {
        let mut buf = vec![0u8; ACCOUNT_SPACE];
        buf[..8].copy_from_slice(&account_discriminator("ProtocolState"));
        buf[8..40].copy_from_slice(snapshot.authority.as_bytes());
        buf[40..72].copy_from_slice(snapshot.operator.as_bytes());
        buf[72..104].copy_from_slice(snapshot.mint_address.as_bytes());
        buf[104..136].copy_from_slice(snapshot.treasury_address.as_bytes());
        buf[136..144].copy_from_slice(&snapshot.total_supply.to_le_bytes());
        buf[144..152].copy_from_slice(&snapshot.total_burned.to_le_bytes());
        buf[152..184].copy_from_slice(&snapshot.current_commitment_root);
        buf[184..192].copy_from_slice(&snapshot.proven_reserves.to_le_bytes());
        buf[192..200].copy_from_slice(&snapshot.last_update_timestamp.to_le_bytes());
        buf[200..208].copy_from_slice(&snapshot.last_proof_timestamp.to_le_bytes());
        buf[208..216].copy_from_slice(&snapshot.price_units.to_le_bytes());
        buf[266] = u8::from(snapshot.is_paused);
        buf[267] = snapshot.bump;
        buf
    }
}

impl StateLayout for LayoutV2 {
    fn version(&self) -> u8 {
        Self::VERSION
    }

    fn min_len(&self) -> usize {
        Self::MIN_LEN
    }

    fn decode(&self, data: &[u8]) -> Result<ProtocolStateSnapshot, LayoutError> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(LayoutError::TooShort {
                len: data.len(),
                min: Self::MIN_LEN,
            });
        }

        let expected = account_discriminator("ProtocolState");
        if data[..DISCRIMINATOR_LEN] != expected {
            return Err(LayoutError::DiscriminatorMismatch {
                found: hex::encode(&data[..DISCRIMINATOR_LEN]),
                expected: hex::encode(expected),
            });
        }

        if data.len() < Self::MIN_LEN {
            if data.len() >= LEGACY_MIN_LEN {
                return Err(LayoutError::LegacyLayout { len: data.len() });
            }
            return Err(LayoutError::TooShort {
                len: data.len(),
                min: Self::MIN_LEN,
            });
        }

        check_remapped(data)?;

        Ok(ProtocolStateSnapshot {
            layout_version: Self::VERSION,
            authority: address_at(data, 8),
            operator: address_at(data, 40),
            mint_address: address_at(data, 72),
            treasury_address: address_at(data, 104),
            total_supply: u64_at(data, 136),
            total_burned: u64_at(data, 144),
            current_commitment_root: bytes32_at(data, 152),
            proven_reserves: u64_at(data, 184),
            last_update_timestamp: i64_at(data, 192),
            last_proof_timestamp: i64_at(data, 200),
            price_units: u64_at(data, 208),
            is_paused: data[266] != 0,
            bump: data[267],
        })
    }
}

/// Markers every remapped V2 account carries. A V1 account that was only
/// resized has zeroes from byte 218 on and V1 fields under V2 offsets.
fn check_remapped(data: &[u8]) -> Result<(), LayoutError> {
    let reason = if data[267] == 0 {
        Some("bump byte is zero".to_string())
    } else if data[266] > 1 {
        Some(format!("pause flag byte is {}", data[266]))
    } else if i64_at(data, 192) < 0 || i64_at(data, 200) < 0 {
        Some("negative update timestamp".to_string())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(LayoutError::NotRemapped { reason }),
        None => Ok(()),
    }
}

// Callers have already checked `data.len() >= MIN_LEN`.

fn bytes32_at(data: &[u8], off: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&data[off..off + 32]);
    out
}

fn address_at(data: &[u8], off: usize) -> Address {
    Address::new(bytes32_at(data, off))
}

fn u64_at(data: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(b)
}

fn i64_at(data: &[u8], off: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[off..off + 8]);
    i64::from_le_bytes(b)
}
