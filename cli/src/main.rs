//! ledgerindex CLI — run ingestion against a SQLite store.
//!
//! Usage:
//! ```bash
//! # Ingest the genesis ledger state
//! ledgerindex genesis --db ./ledgers.db
//!
//! # Ingest one closed ledger exported as JSON
//! ledgerindex ingest-ledger --db ./ledgers.db --ledger ./ledger-100.json --all
//!
//! # Store ingestion filter rules
//! ledgerindex filters --db ./ledgers.db --rules ./rules.json
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledgerindex_core::session::FilterRules;
use ledgerindex_core::types::ClosedLedger;
use ledgerindex_runner::{ProcessorRunner, RunnerConfig};
use ledgerindex_storage::SqliteSession;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "genesis" => cmd_genesis(&args[2..]).await,
        "ingest-ledger" => cmd_ingest_ledger(&args[2..]).await,
        "filters" => cmd_filters(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("ledgerindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("ledgerindex {}", env!("CARGO_PKG_VERSION"));
    println!("Turn ledger history into relational rows\n");
    println!("USAGE:");
    println!("    ledgerindex <COMMAND>\n");
    println!("COMMANDS:");
    println!("    genesis        Ingest the genesis ledger state");
    println!("    ingest-ledger  Run processors on one closed ledger (JSON)");
    println!("    filters        Store ingestion filter rules (JSON)");
    println!("    info           Show default configuration");
    println!("    version        Print version");
    println!("    help           Print this help\n");
    println!("FLAGS:");
    println!("    --db <PATH>       SQLite database  [required]");
    println!("    --config <PATH>   Runner configuration (JSON)");
    println!("    --ledger <PATH>   Closed ledger (JSON)  [ingest-ledger]");
    println!("    --all             Also run change processors  [ingest-ledger]");
    println!("    --rules <PATH>    Filter rules (JSON)  [filters]");
}

fn cmd_info() {
    let config = RunnerConfig::default();
    println!("LedgerIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Network: {}", config.network_passphrase);
    println!("  Max supported protocol version: {}", config.max_supported_protocol_version);
    println!("  Ingestion filtering: {}", config.enable_ingestion_filtering);
    println!("  Filtered-tmp GC period: {}s", config.filtered_tmp_gc_period_secs);
    println!("  Progress log frequency: every {} items", config.log_frequency);
    println!("  Storage backends: memory, SQLite");
}

async fn cmd_genesis(args: &[String]) -> Result<()> {
    let mut runner = open_runner(args).await?;
    let stats = runner.run_genesis_state_ingestion().await?;
    info!(entries = stats.total(), "Genesis state ingested");
    println!("{}", serde_json::to_string_pretty(&stats.as_map())?);
    Ok(())
}

async fn cmd_ingest_ledger(args: &[String]) -> Result<()> {
    let path = parse_flag(args, "--ledger").context("--ledger is required")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let ledger: ClosedLedger =
        serde_json::from_str(&raw).with_context(|| format!("parsing ledger {path}"))?;

    let mut runner = open_runner(args).await?;
    if args.iter().any(|a| a == "--all") {
        let stats = runner.run_all_processors_on_ledger(&ledger).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        let stats = runner.run_transaction_processors_on_ledger(&ledger).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

async fn cmd_filters(args: &[String]) -> Result<()> {
    let db = parse_flag(args, "--db").context("--db is required")?;
    let path = parse_flag(args, "--rules").context("--rules is required")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let rules: FilterRules =
        serde_json::from_str(&raw).with_context(|| format!("parsing filter rules {path}"))?;

    let session = SqliteSession::open(&db).await?;
    session.set_filter_rules(&rules).await?;
    println!(
        "Filter rules stored (asset: {}, account: {})",
        rules.asset.enabled, rules.account.enabled
    );
    Ok(())
}

async fn open_runner(args: &[String]) -> Result<ProcessorRunner> {
    let db = parse_flag(args, "--db").context("--db is required")?;
    let config = match parse_flag(args, "--config") {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            RunnerConfig::from_json(&raw).with_context(|| format!("parsing config {path}"))?
        }
        None => RunnerConfig::default(),
    };
    let session = SqliteSession::open(&db).await?;
    Ok(ProcessorRunner::new(config, Arc::new(session)))
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
