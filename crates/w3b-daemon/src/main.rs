//! w3b-daemon entry point.
//!
//! Loads layered config, resolves secrets from the environment, wires the
//! Postgres stores, chain client and optional price source into the two
//! runners, then serves the trigger surface. Route handlers live in
//! `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use w3b_chain::HttpChainClient;
use w3b_config::{
    report_unused_keys, secrets::resolve_secrets, ConfigSurface, UnusedKeyPolicy, W3bConfig,
};
use w3b_daemon::{routes, state};
use w3b_runtime::{
    HttpPriceSource, PgStore, PriceReconciler, PriceSettings, ReserveReconciler, ReserveSettings,
};

const DEFAULT_CONFIG: &str = "config/w3b.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths_from_env();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = w3b_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(ConfigSurface::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "unused config keys");
    }
    let cfg = loaded.typed()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let secrets = resolve_secrets(&cfg, ConfigSurface::Daemon)?;
    let pool = w3b_db::connect(secrets.require_database_url()?).await?;
    let store = Arc::new(PgStore::new(pool));

    let chain = Arc::new(
        HttpChainClient::new(
            &cfg.chain.rpc_url,
            &cfg.chain.relay_url,
            secrets.require_relay_token()?,
            cfg.request_timeout(),
        )
        .context("build chain client")?,
    );

    let reserve = ReserveReconciler::new(
        store.clone(),
        store,
        chain.clone(),
        ReserveSettings::from_config(&cfg),
    );
    let price = build_price_reconciler(&cfg, chain)?;

    let shared = Arc::new(state::AppState::new(reserve, price));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_reconcile_schedule(
        Arc::clone(&shared),
        Duration::from_secs(cfg.daemon.schedule_secs),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&cfg)?;
    info!("w3b-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `W3B_CONFIG` holds comma-separated paths in merge order.
fn config_paths_from_env() -> Vec<String> {
    std::env::var("W3B_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG.to_string())
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `W3B_DAEMON_ADDR` overrides `daemon.addr`.
fn bind_addr(cfg: &W3bConfig) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("W3B_DAEMON_ADDR").unwrap_or_else(|_| cfg.daemon.addr.clone());
    raw.parse()
        .with_context(|| format!("invalid daemon bind address: {raw}"))
}

fn build_price_reconciler(
    cfg: &W3bConfig,
    chain: Arc<HttpChainClient>,
) -> anyhow::Result<Option<PriceReconciler>> {
    if cfg.price.source_url.is_empty() {
        info!("price.source_url not set; price sync disabled");
        return Ok(None);
    }
    let source = HttpPriceSource::new(
        &cfg.price.source_url,
        &cfg.price.source_pointer,
        cfg.price.units_scale,
        cfg.request_timeout(),
    )
    .context("build price source")?;
    Ok(Some(PriceReconciler::new(
        chain,
        Arc::new(source),
        PriceSettings::from_config(cfg),
    )))
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
