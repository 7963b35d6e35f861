//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (`chain.keys_env.relay_token`,
//!   `db.url_env`).
//! - Binaries call [`resolve_secrets`] once at startup and pass the result into
//!   constructors; no other code reads `std::env::var` for credentials.
//! - `Debug` on [`ResolvedSecrets`] redacts values.
//! - Error messages name the env var, never its value.
//!
//! # Surface enforcement
//! | Surface  | Required                         |
//! |----------|----------------------------------|
//! | DAEMON   | relay token, database url        |
//! | ONESHOT  | nothing up front; checked at use |

use anyhow::{bail, Result};

use crate::settings::W3bConfig;
use crate::ConfigSurface;

#[derive(Clone)]
pub struct ResolvedSecrets {
    relay_token_env: String,
    database_url_env: String,
    /// Bearer token for the signing relay. `None` if unset or blank.
    pub relay_token: Option<String>,
    /// Postgres connection string. `None` if unset or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("relay_token_env", &self.relay_token_env)
            .field("relay_token", &self.relay_token.as_ref().map(|_| "<REDACTED>"))
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ResolvedSecrets {
    /// Relay token, or an error naming the env var that should hold it.
    pub fn require_relay_token(&self) -> Result<&str> {
        match self.relay_token.as_deref() {
            Some(t) => Ok(t),
            None => bail!(
                "SECRETS_MISSING: env var '{}' (relay token) is not set or empty",
                self.relay_token_env
            ),
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(u) => Ok(u),
            None => bail!(
                "SECRETS_MISSING: env var '{}' (database url) is not set or empty",
                self.database_url_env
            ),
        }
    }

    /// Test/embedding constructor that bypasses process env.
    pub fn from_values(relay_token: Option<String>, database_url: Option<String>) -> Self {
        Self {
            relay_token_env: "<inline>".to_string(),
            database_url_env: "<inline>".to_string(),
            relay_token,
            database_url,
        }
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets named in `cfg` for `surface`, failing closed where the
/// surface requires them.
pub fn resolve_secrets(cfg: &W3bConfig, surface: ConfigSurface) -> Result<ResolvedSecrets> {
    let secrets = ResolvedSecrets {
        relay_token_env: cfg.chain.keys_env.relay_token.clone(),
        database_url_env: cfg.db.url_env.clone(),
        relay_token: resolve_env(&cfg.chain.keys_env.relay_token),
        database_url: resolve_env(&cfg.db.url_env),
    };

    if surface == ConfigSurface::Daemon {
        secrets.require_relay_token()?;
        secrets.require_database_url()?;
    }

    Ok(secrets)
}
