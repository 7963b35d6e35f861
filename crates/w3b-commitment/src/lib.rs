//! w3b-commitment
//!
//! Merkle commitment over the off-chain serial ledger.
//!
//! - Leaf = SHA-256 of the serial string bytes.
//! - Serials are ordered by byte value before the tree is built, so the
//!   root depends only on the *set* of serials.
//! - Each parent hashes its two children after sorting the pair by byte
//!   value (`min || max`), so inclusion proofs need no direction bits.
//! - An unpaired trailing node is promoted unchanged to the next level.
//!
//! Deterministic, pure logic. No IO.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Root byte width published on-chain.
pub const ROOT_LEN: usize = 32;

/// Domain tag for the proof receipt recorded after a root publish.
const PROOF_DOMAIN: &[u8] = b"w3b-reserve-proof-v1";

pub type Hash32 = [u8; ROOT_LEN];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitmentError {
    /// No serials: there is no defined root for an empty set.
    EmptySerialSet,
    /// The same serial appeared twice; the ledger key is supposed to be unique.
    DuplicateSerial(String),
}

impl fmt::Display for CommitmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentError::EmptySerialSet => {
                write!(f, "cannot build a commitment over an empty serial set")
            }
            CommitmentError::DuplicateSerial(s) => {
                write!(f, "duplicate serial in ledger read: '{s}'")
            }
        }
    }
}

impl std::error::Error for CommitmentError {}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Durable outputs of one build: the root and the leaf count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub root: Hash32,
    pub root_hex: String,
    pub leaf_count: u64,
}

/// The ephemeral tree. Owned by one reconciliation run; never persisted.
#[derive(Clone, Debug)]
pub struct CommitmentTree {
    /// `levels[0]` are the leaves (in sorted-serial order), last level is the root.
    levels: Vec<Vec<Hash32>>,
    serials: Vec<String>,
}

impl CommitmentTree {
    /// Build the tree over `serials`. Input order is irrelevant.
    pub fn build<S: AsRef<str>>(serials: &[S]) -> Result<Self, CommitmentError> {
        if serials.is_empty() {
            return Err(CommitmentError::EmptySerialSet);
        }

        let mut sorted: Vec<String> = serials.iter().map(|s| s.as_ref().to_string()).collect();
        sorted.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        for w in sorted.windows(2) {
            if w[0] == w[1] {
                return Err(CommitmentError::DuplicateSerial(w[0].clone()));
            }
        }

        let leaves: Vec<Hash32> = sorted.iter().map(|s| leaf_hash(s)).collect();
        let mut levels = vec![leaves];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let prev = &levels[levels.len() - 1];
            let mut next: Vec<Hash32> = Vec::with_capacity(prev.len().div_ceil(2));
            let mut nodes = prev.iter();
            while let Some(a) = nodes.next() {
                next.push(match nodes.next() {
                    Some(b) => hash_pair(a, b),
                    // Odd node out: promoted unchanged.
                    None => *a,
                });
            }
            levels.push(next);
        }

        Ok(Self {
            levels,
            serials: sorted,
        })
    }

    pub fn root(&self) -> Hash32 {
        // build() rejects an empty set, so the top level always holds exactly
        // one node; the zero fallback is never taken.
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or([0u8; ROOT_LEN])
    }

    pub fn leaf_count(&self) -> u64 {
        self.serials.len() as u64
    }

    pub fn commitment(&self) -> Commitment {
        let root = self.root();
        Commitment {
            root,
            root_hex: hex::encode(root),
            leaf_count: self.leaf_count(),
        }
    }

    /// Sibling path from the serial's leaf up to the root. Levels where the
    /// node was promoted without a sibling contribute nothing.
    pub fn inclusion_proof(&self, serial: &str) -> Option<Vec<Hash32>> {
        let mut idx = self
            .serials
            .binary_search_by(|s| s.as_bytes().cmp(serial.as_bytes()))
            .ok()?;

        let mut path = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            if sibling < level.len() {
                path.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(path)
    }
}

/// Convenience wrapper: build and return only the durable outputs.
pub fn build_commitment<S: AsRef<str>>(serials: &[S]) -> Result<Commitment, CommitmentError> {
    Ok(CommitmentTree::build(serials)?.commitment())
}

/// Check an inclusion proof produced by [`CommitmentTree::inclusion_proof`].
pub fn verify_inclusion(root: &Hash32, serial: &str, proof: &[Hash32]) -> bool {
    let computed = proof
        .iter()
        .fold(leaf_hash(serial), |acc, sibling| hash_pair(&acc, sibling));
    &computed == root
}

/// Attestation hash carried by the proof-record instruction.
pub fn reserve_proof_hash(root: &Hash32, leaf_count: u64) -> Hash32 {
    let mut h = Sha256::new();
    h.update(PROOF_DOMAIN);
    h.update(root);
    h.update(leaf_count.to_le_bytes());
    h.finalize().into()
}

/// Normalise a root of another width to the 32-byte on-chain format
/// (right-padded with zeros, truncated if longer).
pub fn pad_root(raw: &[u8]) -> Hash32 {
    let mut out = [0u8; ROOT_LEN];
    let n = raw.len().min(ROOT_LEN);
    out[..n].copy_from_slice(&raw[..n]);
    out
}

pub fn leaf_hash(serial: &str) -> Hash32 {
    Sha256::digest(serial.as_bytes()).into()
}

fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut h = Sha256::new();
    h.update(lo);
    h.update(hi);
    h.finalize().into()
}
