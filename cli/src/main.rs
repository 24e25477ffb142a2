//! chaincall CLI: aggregate and watch contract calls from the terminal.
//!
//! Usage:
//! ```bash
//! # One aggregate call against a preset network
//! chaincall aggregate --preset ethereum --calls calls.json
//!
//! # Against a custom node and aggregator contract
//! chaincall aggregate --url http://localhost:8545 \
//!     --multicall 0xcA11bde05977b3631167028862bE2a173976CA11 --calls calls.json
//!
//! # Keep watching, polling every 2s and on every new head
//! chaincall watch --preset ethereum --calls calls.json --interval-ms 2000 \
//!     --ws wss://ethereum-rpc.publicnode.com
//!
//! # List built-in presets
//! chaincall presets
//! ```
//!
//! The calls file is a JSON array of
//! `{ "target"?, "call": [signature, ...args], "returns": [[key], ...] }`.

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chaincall_core::{Address, Aggregator, CallDescriptor, Endpoint, PresetRegistry};
use chaincall_http::HttpTransport;
use chaincall_watcher::{Watcher, WatcherConfig};
use chaincall_ws::{NewHeads, NewHeadsConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }
    init_tracing(has_flag(&args, "--json-logs"));

    let result = match args[1].as_str() {
        "aggregate" => cmd_aggregate(&args[2..]).await,
        "watch" => cmd_watch(&args[2..]).await,
        "presets" => {
            cmd_presets();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chaincall {}", env!("CARGO_PKG_VERSION"));
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
    println!("chaincall {}", env!("CARGO_PKG_VERSION"));
    println!("Batch read-only contract calls into one multicall\n");
    println!("USAGE:");
    println!("    chaincall <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    aggregate  Run the calls once and print the results as JSON");
    println!("    watch      Keep polling and log every changed value");
    println!("    presets    List built-in network presets");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --calls <FILE>        JSON array of call descriptors  [required]");
    println!("    --preset <NAME>       Built-in network (see `presets`)");
    println!("    --url <URL>           RPC endpoint (with --multicall)");
    println!("    --multicall <ADDR>    Aggregator contract address (with --url)");
    println!("    --require-success     Revert the whole batch if any call fails");
    println!("    --interval-ms <N>     Poll interval for `watch` (default 1000)");
    println!("    --ws <URL>            Websocket endpoint for new-head notifications");
    println!("    --json-logs           Emit logs as JSON (filter with RUST_LOG)");
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn cmd_aggregate(args: &[String]) -> Result<()> {
    let endpoint = parse_endpoint(args)?;
    let calls = load_calls(args)?;
    let require_success = has_flag(args, "--require-success");

    let aggregator = Aggregator::new(Arc::new(HttpTransport::with_defaults()?));
    let aggregation = aggregator
        .aggregate(calls, require_success, &endpoint)
        .await?;

    println!("{}", serde_json::to_string_pretty(&aggregation.results)?);
    Ok(())
}

async fn cmd_watch(args: &[String]) -> Result<()> {
    let endpoint = parse_endpoint(args)?;
    let calls = load_calls(args)?;
    let require_success = has_flag(args, "--require-success");

    let mut config = WatcherConfig::new(endpoint);
    if let Some(ms) = parse_flag(args, "--interval-ms") {
        let ms: u64 = ms.parse().with_context(|| format!("invalid --interval-ms `{ms}`"))?;
        config = config.with_interval(Duration::from_millis(ms));
    }

    let aggregator = Arc::new(Aggregator::new(Arc::new(HttpTransport::with_defaults()?)));
    let watcher = Watcher::new(aggregator, calls, require_success, config);

    watcher.subscribe(|u| {
        let args: Vec<String> = u.args.iter().map(ToString::to_string).collect();
        tracing::info!(key = %u.key, value = %u.value, args = ?args, "update");
    });
    watcher.on_new_block(|block| tracing::info!(block, "new block"));
    watcher.on_poll(|p| {
        tracing::debug!(request_id = p.id, retry = ?p.retry, latest = ?p.latest_block_number, "poll")
    });
    watcher.on_error(|e, snapshot| {
        tracing::warn!(error = %e, block = ?snapshot.block_number, "watch error")
    });

    if let Some(url) = parse_flag(args, "--ws") {
        tracing::info!(%url, "subscribing to new heads");
        watcher.with_block_source(NewHeads::connect(url, NewHeadsConfig::default()));
    }

    watcher.start();
    if let Err(e) = watcher.await_initial_fetch().await {
        tracing::warn!(error = %e, "initial fetch did not complete");
    }

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    watcher.stop();
    Ok(())
}

fn cmd_presets() {
    println!("Built-in presets:\n");
    for (name, preset) in PresetRegistry::builtin().iter() {
        println!("  {name:<10} {}", preset.rpc_url);
        println!("  {:<10} multicall {}", "", preset.multicall_address);
    }
}

fn parse_endpoint(args: &[String]) -> Result<Endpoint> {
    if let Some(name) = parse_flag(args, "--preset") {
        return Ok(Endpoint::preset(name));
    }
    let url = parse_flag(args, "--url").ok_or_else(|| anyhow!("--preset or --url is required"))?;
    let multicall = parse_flag(args, "--multicall")
        .ok_or_else(|| anyhow!("--multicall is required with --url"))?;
    let address: Address = multicall
        .parse()
        .with_context(|| format!("invalid --multicall address `{multicall}`"))?;
    Ok(Endpoint::custom(url, address))
}

fn load_calls(args: &[String]) -> Result<Vec<CallDescriptor>> {
    let path = parse_flag(args, "--calls").ok_or_else(|| anyhow!("--calls is required"))?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("cannot read {path}"))?;
    let calls: Vec<CallDescriptor> =
        serde_json::from_str(&raw).with_context(|| format!("invalid call descriptors in {path}"))?;
    if calls.is_empty() {
        bail!("{path} contains no calls");
    }
    Ok(calls)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
