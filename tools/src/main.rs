//! revrecon: headless operator tool for the reconciliation engine.
//!
//! Usage:
//!   revrecon ingest --provider stripe --file payload.json --db recon.db
//!   revrecon lead --file lead.json --db recon.db
//!   revrecon queue [--provider starling] --db recon.db
//!   revrecon resolve --id <queue_id> [--identity <identity_id>] --db recon.db
//!   revrecon bulk-retry [--provider starling] --db recon.db
//!   revrecon recompute [--identity <identity_id>] --db recon.db
//!   revrecon summary --identity <identity_id> --db recon.db
//!   revrecon stats --db recon.db

use anyhow::{anyhow, bail, Context, Result};
use revrecon_core::{config::EngineConfig, engine::Engine, transaction::Provider};
use std::env;
use std::fs;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("no command given (ingest | lead | queue | resolve | bulk-retry | recompute | summary | stats)");
    };

    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config = match flag_value(&args, "--config") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            EngineConfig::from_json(&text)?
        }
        None => EngineConfig::default(),
    };
    let engine = Engine::open(db, config)?;
    log::debug!("database: {db}");

    match command {
        "ingest" => cmd_ingest(&engine, &args),
        "lead" => cmd_lead(&engine, &args),
        "queue" => cmd_queue(&engine, &args),
        "resolve" => cmd_resolve(&engine, &args),
        "bulk-retry" => cmd_bulk_retry(&engine, &args),
        "recompute" => cmd_recompute(&engine, &args),
        "summary" => cmd_summary(&engine, &args),
        "stats" => cmd_stats(&engine),
        other => bail!("unknown command '{other}'"),
    }
}

fn cmd_ingest(engine: &Engine, args: &[String]) -> Result<()> {
    let provider = provider_flag(args)?
        .ok_or_else(|| anyhow!("ingest requires --provider"))?;
    let payload = read_json_flag(args, "--file")?;
    let result = engine.ingest(provider, &payload)?;
    println!(
        "{} {} -> {} (matched: {}, queued: {})",
        provider.as_str(),
        result.external_id,
        result.outcome.as_str(),
        result.matched,
        result.queued
    );
    Ok(())
}

fn cmd_lead(engine: &Engine, args: &[String]) -> Result<()> {
    let payload = read_json_flag(args, "--file")?;
    let identity_id = engine.intake_lead(&payload)?;
    println!("identity: {identity_id}");
    Ok(())
}

fn cmd_queue(engine: &Engine, args: &[String]) -> Result<()> {
    let items = engine.open_queue_items(provider_flag(args)?)?;
    if items.is_empty() {
        println!("queue empty");
        return Ok(());
    }
    for view in &items {
        println!(
            "{} | {} {} | {} {} | {} | candidates: {}",
            view.item.queue_id,
            view.txn.provider.as_str(),
            view.txn.external_id,
            view.txn.amount_minor,
            view.txn.currency,
            view.item.reason,
            view.item.candidates.join(", "),
        );
    }
    println!("{} open item(s)", items.len());
    Ok(())
}

fn cmd_resolve(engine: &Engine, args: &[String]) -> Result<()> {
    let queue_id =
        flag_value(args, "--id").ok_or_else(|| anyhow!("resolve requires --id"))?;
    let identity = flag_value(args, "--identity");
    let by = flag_value(args, "--by").unwrap_or("operator");
    engine.resolve_queue_item(queue_id, identity, by)?;
    match identity {
        Some(id) => println!("resolved {queue_id} -> {id}"),
        None => println!("closed {queue_id} as unmatchable"),
    }
    Ok(())
}

fn cmd_bulk_retry(engine: &Engine, args: &[String]) -> Result<()> {
    let report = engine.bulk_retry(provider_flag(args)?)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_recompute(engine: &Engine, args: &[String]) -> Result<()> {
    match flag_value(args, "--identity") {
        Some(identity_id) => {
            let summary = engine.recompute_ltv(identity_id)?;
            println!(
                "{}: all {} paid {}",
                summary.identity_id, summary.all_minor, summary.paid_minor
            );
        }
        None => {
            let processed = engine.recompute_all_ltv()?;
            println!("recomputed {processed} identities");
        }
    }
    Ok(())
}

fn cmd_summary(engine: &Engine, args: &[String]) -> Result<()> {
    let identity_id =
        flag_value(args, "--identity").ok_or_else(|| anyhow!("summary requires --identity"))?;
    let summary = engine.ltv_summary(identity_id)?;
    println!("=== LTV SUMMARY ===");
    println!("  identity:  {}", summary.identity_id);
    println!("  all:       {}", summary.all_minor);
    println!("  paid:      {}", summary.paid_minor);
    println!("  paid chan: {}", summary.is_paid_channel);
    for (category, total) in &summary.categories {
        println!("  {:>16}: {}", category.as_str(), total);
    }
    Ok(())
}

fn cmd_stats(engine: &Engine) -> Result<()> {
    println!("=== STORE STATS ===");
    println!("  transactions:  {}", engine.store.txn_count()?);
    println!("  identities:    {}", engine.store.identity_count()?);
    println!("  open queue:    {}", engine.store.open_queue_count()?);
    println!("  mappings:      {}", engine.store.counterparty_count()?);
    println!("  ads ledger:    {}", engine.store.ads_attribution_count()?);
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn provider_flag(args: &[String]) -> Result<Option<Provider>> {
    match flag_value(args, "--provider") {
        None => Ok(None),
        Some(tag) => Provider::parse(tag)
            .map(Some)
            .ok_or_else(|| anyhow!("unknown provider '{tag}'")),
    }
}

fn read_json_flag(args: &[String], flag: &str) -> Result<serde_json::Value> {
    let path = flag_value(args, flag).ok_or_else(|| anyhow!("missing {flag}"))?;
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(serde_json::from_str(&text)?)
}
