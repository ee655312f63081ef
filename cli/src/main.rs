//! kasgate CLI — query and watch a Kaspa full node from the terminal.
//!
//! Usage:
//! ```bash
//! # Node sync position and network stats
//! kasgate status
//!
//! # Balance + reconciled transaction page for an address
//! kasgate address kaspa:qq... --limit 10 --offset 0
//!
//! # Stream new-block events
//! kasgate watch
//!
//! # Run the live block indexer into SQLite
//! kasgate index --db ./kasgate.db
//! ```
//!
//! Environment:
//! - `KASGATE_NODE_URL`      node stream endpoint (default ws://127.0.0.1:18110)
//! - `KASGATE_EXPLORER_URL`  explorer REST base (default https://api.kaspa.org)

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;

use kasgate_index::{BlockIndexer, MemoryStore, TransactionStore};
use kasgate_ledger::{HistoryClient, MarketClient, Reconciler};
use kasgate_node::{BlockFeed, NodeClient, NodeClientConfig, WsConnector};

const DEFAULT_NODE_URL: &str = "ws://127.0.0.1:18110";
const DEFAULT_EXPLORER_URL: &str = "https://api.kaspa.org";
const SOMPI_PER_KAS: f64 = 100_000_000.0;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "status" => cmd_status().await,
        "address" => cmd_address(&args[2..]).await,
        "block" => cmd_block(&args[2..]).await,
        "watch" => cmd_watch().await,
        "market" => cmd_market().await,
        "index" => cmd_index(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("kasgate {}", env!("CARGO_PKG_VERSION"));
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
    println!("kasgate {}", env!("CARGO_PKG_VERSION"));
    println!("Query and watch a Kaspa full node\n");
    println!("USAGE:");
    println!("    kasgate <COMMAND>\n");
    println!("COMMANDS:");
    println!("    status   Node sync position and network stats");
    println!("    address  Balance + reconciled transactions for an address");
    println!("    block    Show one block by hash");
    println!("    watch    Stream new-block events");
    println!("    market   Current market statistics");
    println!("    index    Run the live block indexer");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("ADDRESS FLAGS:");
    println!("    --limit <N>    Page size       [default: 10]");
    println!("    --offset <N>   Page offset     [default: 0]\n");
    println!("INDEX FLAGS:");
    println!("    --db <PATH>    SQLite file (in-memory store if omitted)");
}

fn node_url() -> String {
    env::var("KASGATE_NODE_URL").unwrap_or_else(|_| DEFAULT_NODE_URL.to_string())
}

fn explorer_url() -> String {
    env::var("KASGATE_EXPLORER_URL").unwrap_or_else(|_| DEFAULT_EXPLORER_URL.to_string())
}

async fn connect_node() -> anyhow::Result<NodeClient> {
    let url = node_url();
    let client = NodeClient::connect(
        Arc::new(WsConnector::new(&url)),
        NodeClientConfig::default(),
    );
    client
        .wait_until_open()
        .await
        .with_context(|| format!("connecting to node at {url}"))?;
    Ok(client)
}

fn format_kas(sompi: u64) -> String {
    format!("{:.8} KAS", sompi as f64 / SOMPI_PER_KAS)
}

async fn cmd_status() -> anyhow::Result<()> {
    let client = connect_node().await?;

    let dag = client
        .get_block_dag_info()
        .await
        .context("fetching DAG info")?;
    let stats = client
        .network_stats()
        .await
        .context("fetching network stats")?;

    println!("Node:         {}", node_url());
    println!("Network:      {}", dag.network_name);
    println!("DAA score:    {}", stats.daa_score);
    println!("Blocks:       {}", dag.block_count);
    println!("Headers:      {}", dag.header_count);
    println!("Tips:         {}", dag.tip_hashes.len());
    println!("Hashrate:     {} H/s", stats.hashrate);
    println!("Circulating:  {}", format_kas(stats.circulating_sompi));
    println!("Peers:        {}", stats.peer_count);

    client.close();
    Ok(())
}

async fn cmd_address(args: &[String]) -> anyhow::Result<()> {
    let address = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .context("address is required")?
        .clone();
    let limit: u64 = parse_flag(args, "--limit").map(|v| v.parse()).transpose()
        .context("--limit must be a number")?
        .unwrap_or(10);
    let offset: u64 = parse_flag(args, "--offset").map(|v| v.parse()).transpose()
        .context("--offset must be a number")?
        .unwrap_or(0);

    let client = Arc::new(connect_node().await?);
    let history = Arc::new(HistoryClient::new(explorer_url()));
    let reconciler =
        Reconciler::new(client.clone(), None, history).with_utxo_fallback(client.clone());

    let balance = client
        .get_balance_by_address(&kasgate_ledger::history::with_prefix(&address))
        .await
        .context("fetching balance")?;
    let page = reconciler
        .page(&address, limit, offset)
        .await
        .context("reconciling transactions")?;

    println!("Address:  {}", kasgate_ledger::history::with_prefix(&address));
    println!("Balance:  {}", format_kas(balance));
    println!(
        "Transactions ({} shown, {} confirmed total):",
        page.records.len(),
        page.total_count
    );
    for record in &page.records {
        let status = if record.confirmed {
            format!("daa {}", record.daa_score)
        } else {
            "pending".to_string()
        };
        println!(
            "  {:>9} {:>22}  [{status}]  {}",
            record.direction.to_string(),
            format_kas(record.amount),
            record.id
        );
    }

    client.close();
    Ok(())
}

async fn cmd_block(args: &[String]) -> anyhow::Result<()> {
    let hash = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .context("block hash is required")?;

    let client = connect_node().await?;
    let resp = client
        .get_block(hash, true)
        .await
        .with_context(|| format!("fetching block {hash}"))?;
    let block = resp.block.context("node returned no block for that hash")?;

    println!("Block:        {}", block.verbose_data.hash);
    println!("DAA score:    {}", block.header.daa_score);
    println!("Timestamp:    {}", block.header.timestamp);
    println!("Transactions: {}", block.transactions.len());
    for tx in &block.transactions {
        let outputs: u64 = tx.outputs.iter().map(|o| o.amount).sum();
        println!(
            "  {}  {} outputs, {}",
            tx.verbose_data.transaction_id,
            tx.outputs.len(),
            format_kas(outputs)
        );
    }

    client.close();
    Ok(())
}

async fn cmd_watch() -> anyhow::Result<()> {
    let client = connect_node().await?;
    let feed = BlockFeed::spawn(&client, 64).context("starting block feed")?;
    let mut events = feed.subscribe();

    println!("Watching for new blocks (Ctrl-C to stop)...");
    loop {
        match events.recv().await {
            Ok(ev) => println!(
                "block {}  txs {}  daa {}",
                ev.hash, ev.transaction_count, ev.daa_score
            ),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                eprintln!("(lagged, {missed} events dropped)");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

async fn cmd_market() -> anyhow::Result<()> {
    let stats = MarketClient::default_endpoint()
        .stats()
        .await
        .context("fetching market stats")?;

    println!("Price:       ${:.6}", stats.price);
    println!("24h change:  {:+.2}%", stats.price_change_24h);
    println!("24h volume:  ${:.0}", stats.volume_24h);
    println!("Market cap:  ${:.0}", stats.market_cap);
    Ok(())
}

async fn cmd_index(args: &[String]) -> anyhow::Result<()> {
    let store: Arc<dyn TransactionStore> = match parse_flag(args, "--db") {
        Some(path) => Arc::new(
            kasgate_index::sqlite::SqliteStore::open(&path)
                .await
                .with_context(|| format!("opening database {path}"))?,
        ),
        None => {
            println!("No --db given; indexing into memory (lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    let client = connect_node().await?;
    client
        .notify_block_added()
        .context("subscribing to block notifications")?;
    let (_handler, notifications) = client.subscribe("blockAddedNotification");

    println!("Indexing blocks from {} (Ctrl-C to stop)...", node_url());
    BlockIndexer::new(store).run(notifications).await;
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
