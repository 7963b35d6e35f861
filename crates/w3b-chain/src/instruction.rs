//! Ledger program instructions and their wire encoding.
//!
//! Data = `sha256("global:<name>")[..8]` followed by little-endian arguments.
//! `Vec<u8>` arguments are a u32 LE length prefix then the bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Sets `current_commitment_root = root` and `proven_reserves = total_serials`.
    PublishCommitment {
        #[serde(with = "w3b_schemas::hex32")]
        root: [u8; 32],
        total_serials: u64,
    },
    /// Attestation receipt; `claimed_reserves` must equal on-chain proven reserves.
    RecordProof {
        proof_hash: Vec<u8>,
        claimed_reserves: u64,
    },
    /// Mint `amount` to the treasury.
    Mint { amount: u64 },
    SetPrice { price_units: u64 },
}

impl Instruction {
    /// Program-side instruction name.
    pub fn program_name(&self) -> &'static str {
        match self {
            Instruction::PublishCommitment { .. } => "update_merkle_root",
            Instruction::RecordProof { .. } => "submit_proof",
            Instruction::Mint { .. } => "mint_w3b",
            Instruction::SetPrice { .. } => "set_w3b_price",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = instruction_discriminator(self.program_name()).to_vec();
        match self {
            Instruction::PublishCommitment {
                root,
                total_serials,
            } => {
                out.extend_from_slice(root);
                out.extend_from_slice(&total_serials.to_le_bytes());
            }
            Instruction::RecordProof {
                proof_hash,
                claimed_reserves,
            } => {
                out.extend_from_slice(&(proof_hash.len() as u32).to_le_bytes());
                out.extend_from_slice(proof_hash);
                out.extend_from_slice(&claimed_reserves.to_le_bytes());
            }
            Instruction::Mint { amount } => out.extend_from_slice(&amount.to_le_bytes()),
            Instruction::SetPrice { price_units } => {
                out.extend_from_slice(&price_units.to_le_bytes())
            }
        }
        out
    }
}

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}
