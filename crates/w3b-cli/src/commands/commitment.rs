use std::fs;

use anyhow::{Context, Result};
use w3b_commitment::CommitmentTree;

/// Offline root over a serial file: one serial per line, empty lines ignored.
///
/// Serials are hashed byte for byte as the ledger stores them; only the line
/// terminator (`\n` or `\r\n`) is stripped.
pub fn root(path: &str, prove: Option<&str>) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("read serial file failed: {path}"))?;
    let serials: Vec<&str> = raw.lines().filter(|l| !l.is_empty()).collect();

    let tree = CommitmentTree::build(&serials).context("build commitment")?;
    let c = tree.commitment();
    println!("root={}", c.root_hex);
    println!("leaf_count={}", c.leaf_count);

    if let Some(serial) = prove {
        let proof = tree
            .inclusion_proof(serial)
            .with_context(|| format!("serial not in set: {serial}"))?;
        println!("serial={serial}");
        println!(
            "proof={}",
            proof.iter().map(hex::encode).collect::<Vec<_>>().join(",")
        );
    }
    Ok(())
}
