use std::sync::Arc;

use anyhow::{bail, Context, Result};
use w3b_config::{secrets::resolve_secrets, ConfigSurface};
use w3b_runtime::{
    HttpPriceSource, PgStore, PriceReconciler, PriceReport, PriceSettings, ReconciliationReport,
    ReconciliationRequest, ReserveReconciler, ReserveSettings,
};

use super::{chain_client, load_config, opt};

pub async fn run_reserve(
    config_paths: &[String],
    allow_reserve_decrease: bool,
    no_mint: bool,
    json: bool,
) -> Result<()> {
    let (config_hash, cfg) = load_config(config_paths)?;
    let secrets = resolve_secrets(&cfg, ConfigSurface::Oneshot)?;
    secrets.require_relay_token()?;
    let pool = w3b_db::connect(secrets.require_database_url()?).await?;
    let store = Arc::new(PgStore::new(pool));
    let chain = chain_client(&cfg, &secrets)?;

    let reconciler =
        ReserveReconciler::new(store.clone(), store, chain, ReserveSettings::from_config(&cfg));
    let report = reconciler
        .run(ReconciliationRequest::cli(allow_reserve_decrease, no_mint))
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("config_hash={config_hash}");
        print_reserve_report(&report);
    }

    if let Some(err) = &report.error {
        bail!("RECONCILE_FAILED kind={} {}", err.kind, err.message);
    }
    Ok(())
}

pub async fn run_price(config_paths: &[String], json: bool) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    if cfg.price.source_url.is_empty() {
        bail!("price.source_url is not configured");
    }
    let secrets = resolve_secrets(&cfg, ConfigSurface::Oneshot)?;
    secrets.require_relay_token()?;
    let chain = chain_client(&cfg, &secrets)?;
    let source = HttpPriceSource::new(
        &cfg.price.source_url,
        &cfg.price.source_pointer,
        cfg.price.units_scale,
        cfg.request_timeout(),
    )
    .context("build price source")?;

    let reconciler = PriceReconciler::new(chain, Arc::new(source), PriceSettings::from_config(&cfg));
    let report = reconciler.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_price_report(&report);
    }

    if let Some(err) = &report.error {
        bail!("PRICE_SYNC_FAILED kind={} {}", err.kind, err.message);
    }
    Ok(())
}

fn print_reserve_report(r: &ReconciliationReport) {
    println!("run_id={}", r.run_id);
    println!("success={}", r.success);
    println!("outcome={}", r.outcome.as_str());
    println!("root={}", opt(&r.root_hex));
    println!("leaf_count={}", opt(&r.leaf_count));
    for s in &r.steps {
        println!(
            "step.{}={} amount={} signature={}",
            s.step.as_str(),
            s.status.as_str(),
            s.amount,
            opt(&s.signature)
        );
    }
    if let Some(after) = &r.after {
        println!("supply_after={}", after.total_supply);
        println!("proven_reserves_after={}", after.proven_reserves);
    }
    println!("post_invariant_holds={}", opt(&r.post_invariant_holds));
    for line in &r.log {
        println!("log={line}");
    }
}

fn print_price_report(r: &PriceReport) {
    println!("run_id={}", r.run_id);
    println!("success={}", r.success);
    println!("on_chain_price={}", opt(&r.on_chain_price));
    println!("candidate_price={}", opt(&r.candidate_price));
    if let Some(d) = &r.decision {
        println!("decision={}", serde_json::to_string(d).unwrap_or_default());
    }
    println!("signature={}", opt(&r.signature));
    for line in &r.log {
        println!("log={line}");
    }
}
