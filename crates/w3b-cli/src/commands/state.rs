use anyhow::{Context, Result};
use w3b_chain::read_state;
use w3b_config::{secrets::resolve_secrets, ConfigSurface};

use super::{chain_client, load_config};

pub async fn show(config_paths: &[String], json: bool) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let secrets = resolve_secrets(&cfg, ConfigSurface::Oneshot)?;
    let chain = chain_client(&cfg, &secrets)?;

    let s = read_state(chain.as_ref(), &cfg.chain.state_address)
        .await
        .with_context(|| format!("read protocol state {}", cfg.chain.state_address))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&s)?);
        return Ok(());
    }
    println!("state_address={}", cfg.chain.state_address);
    println!("layout_version={}", s.layout_version);
    println!("authority={}", s.authority);
    println!("operator={}", s.operator);
    println!("mint_address={}", s.mint_address);
    println!("treasury_address={}", s.treasury_address);
    println!("total_supply={}", s.total_supply);
    println!("total_burned={}", s.total_burned);
    println!("proven_reserves={}", s.proven_reserves);
    println!("commitment_root={}", s.root_hex());
    println!("last_update_timestamp={}", s.last_update_timestamp);
    println!("last_proof_timestamp={}", s.last_proof_timestamp);
    println!("price_units={}", s.price_units);
    println!("is_paused={}", s.is_paused);
    println!("solvent={}", s.is_solvent());
    Ok(())
}
