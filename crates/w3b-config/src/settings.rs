//! Typed configuration.
//!
//! Deserialised from the merged layer tree produced by
//! [`crate::load_layered_yaml`]. Components receive this struct (plus
//! [`crate::secrets::ResolvedSecrets`]) at construction and never read process
//! env themselves.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use w3b_schemas::Address;

/// Basis-point denominator.
pub const BPS_DENOM: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct W3bConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub reserve: ReserveConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint used for account reads and signature status.
    pub rpc_url: String,
    /// Signing relay that turns instructions into submitted transactions.
    pub relay_url: String,
    /// Protocol state account (the program's derived address).
    pub state_address: Address,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    #[serde(default = "default_confirm_max_polls")]
    pub confirm_max_polls: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub keys_env: ChainKeysEnv,
}

/// Env var NAMES for chain credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainKeysEnv {
    pub relay_token: String,
}

impl Default for ChainKeysEnv {
    fn default() -> Self {
        Self {
            relay_token: "W3B_RELAY_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Env var NAME holding the Postgres connection string.
    pub url_env: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url_env: "W3B_DATABASE_URL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveConfig {
    /// Operator override: permit a proposed count below proven reserves.
    pub allow_reserve_decrease: bool,
    /// Mint the supply delta after a successful publish.
    pub auto_mint: bool,
    /// Delay before reading the ledger after a batch-insert webhook.
    pub debounce_ms: u64,
    /// Bound on the pre-sequence phase of one run.
    pub run_timeout_ms: u64,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            allow_reserve_decrease: false,
            auto_mint: true,
            debounce_ms: 2_000,
            run_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Minimum relative drift before a publish, in basis points.
    pub drift_threshold_bps: u32,
    /// Largest single publish move the ledger program accepts, in basis points.
    pub max_step_bps: u32,
    /// JSON endpoint providing the off-chain rate. Empty disables the price job.
    pub source_url: String,
    /// JSON pointer to the numeric rate inside the response.
    pub source_pointer: String,
    /// Multiplier from the source's unit to on-chain price units.
    pub units_scale: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            drift_threshold_bps: 100,
            max_step_bps: 2_000,
            source_url: String::new(),
            source_pointer: "/price".to_string(),
            units_scale: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub addr: String,
    /// Period of the scheduled reserve run; 0 disables the scheduler.
    pub schedule_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
            schedule_secs: 0,
        }
    }
}

fn default_confirm_poll_ms() -> u64 {
    500
}

fn default_confirm_max_polls() -> u32 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl W3bConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: W3bConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            bail!("CONFIG_INVALID chain.rpc_url must not be empty");
        }
        if self.chain.relay_url.trim().is_empty() {
            bail!("CONFIG_INVALID chain.relay_url must not be empty");
        }
        if self.chain.confirm_poll_ms == 0 || self.chain.confirm_max_polls == 0 {
            bail!("CONFIG_INVALID chain.confirm_poll_ms and chain.confirm_max_polls must be > 0");
        }
        if self.chain.keys_env.relay_token.trim().is_empty() {
            bail!("CONFIG_INVALID chain.keys_env.relay_token must name an env var");
        }
        if self.db.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID db.url_env must name an env var");
        }
        if self.reserve.run_timeout_ms == 0 {
            bail!("CONFIG_INVALID reserve.run_timeout_ms must be > 0");
        }
        // The debounce sleep runs inside the run timeout.
        if self.reserve.debounce_ms >= self.reserve.run_timeout_ms {
            bail!(
                "CONFIG_INVALID reserve.debounce_ms={} must be below reserve.run_timeout_ms={}",
                self.reserve.debounce_ms,
                self.reserve.run_timeout_ms
            );
        }
        check_bps("price.drift_threshold_bps", self.price.drift_threshold_bps)?;
        check_bps("price.max_step_bps", self.price.max_step_bps)?;
        if self.price.units_scale == 0 {
            bail!("CONFIG_INVALID price.units_scale must be > 0");
        }
        Ok(())
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.chain.confirm_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.chain.request_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.reserve.debounce_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.reserve.run_timeout_ms)
    }
}

fn check_bps(name: &str, v: u32) -> Result<()> {
    if v == 0 || v > BPS_DENOM {
        bail!("CONFIG_INVALID {name}={v} must be in (0, {BPS_DENOM}]");
    }
    Ok(())
}
