//! Command handler modules for w3b-cli.
//!
//! Shared utilities used by multiple command paths live here.

pub mod commitment;
pub mod reconcile;
pub mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use w3b_chain::HttpChainClient;
use w3b_config::{
    report_unused_keys, secrets::ResolvedSecrets, ConfigSurface, UnusedKeyPolicy, W3bConfig,
};

/// Tracing goes to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

/// Load layered config for the oneshot surface. Unused keys are warned about,
/// not fatal.
pub fn load_config(paths: &[String]) -> Result<(String, W3bConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = w3b_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(ConfigSurface::Oneshot, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &unused.unused_leaf_pointers {
        tracing::warn!(surface = %unused.surface, key = %key, "unused config key");
    }
    let cfg = loaded.typed()?;
    Ok((loaded.config_hash, cfg))
}

/// Chain client. Read-only commands may run without a relay token; any
/// submit then fails at the relay.
pub fn chain_client(cfg: &W3bConfig, secrets: &ResolvedSecrets) -> Result<Arc<HttpChainClient>> {
    let token = secrets.relay_token.as_deref().unwrap_or_default();
    let client = HttpChainClient::new(
        &cfg.chain.rpc_url,
        &cfg.chain.relay_url,
        token,
        cfg.request_timeout(),
    )
    .context("build chain client")?;
    Ok(Arc::new(client))
}

pub fn opt<T: std::fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}
