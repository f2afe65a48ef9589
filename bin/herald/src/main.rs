//! Herald - Substrate chain-event listener.
//!
//! # Usage
//!
//! ```bash
//! # Follow the chain, printing events as JSON lines
//! herald listen
//!
//! # Replay the chain from block 1000, then follow the head
//! herald listen --archival --start-block 1000
//!
//! # Dump events for every open entity on chain
//! WS_URL=ws://localhost:9944 herald fetch
//!
//! # Identity events for a set of accounts
//! herald fetch --identities 5Grw...,5FHn...
//! ```

mod printer;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use herald_core::metrics::init_metrics;
use herald_core::models::{CollectiveName, DisconnectedRange, EntityKind};
use herald_core::ports::{ChainApi, EventHandler, HandlerChain, StaticRange};
use herald_core::services::{
    DEFAULT_ENRICH_CONCURRENCY, DEFAULT_MAX_BATCH_SIZE, Listener, ListenerOptions, StorageFetcher,
};
use herald_substrate::{SubstrateClient, SubstrateClientConfig};

use crate::printer::JsonLinesHandler;

/// Herald CLI - Substrate chain-event listener.
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Herald - typed event feed for Substrate chains")]
#[command(version)]
struct Cli {
    /// Substrate node WebSocket URL.
    #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:9944")]
    ws_url: String,

    /// Chain identifier stamped on every event.
    #[arg(long, env = "CHAIN", default_value = "edgeware")]
    chain: String,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Catch up, then follow the chain head.
    Listen(ListenArgs),
    /// Synthesize events from current chain state and exit.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Do not catch up on blocks missed while offline.
    #[arg(long)]
    skip_catchup: bool,

    /// Replay the whole chain from --start-block before following the head.
    #[arg(long)]
    archival: bool,

    /// First block to process (archival start, or start of the offline range).
    #[arg(long)]
    start_block: Option<u64>,

    /// Last block of the offline range.
    #[arg(long)]
    end_block: Option<u64>,

    /// Log every block at info level.
    #[arg(long)]
    verbose: bool,

    /// Blocks fetched per catch-up window.
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    max_batch_size: u64,

    /// Enrichments in flight per block.
    #[arg(long, env = "ENRICH_CONCURRENCY", default_value_t = DEFAULT_ENRICH_CONCURRENCY)]
    enrich_concurrency: usize,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Only fetch identities of these comma-separated accounts.
    #[arg(long, value_delimiter = ',', conflicts_with = "entity")]
    identities: Vec<String>,

    /// Only fetch one entity (e.g. democracy-referendum), identified by --id.
    #[arg(long, requires = "id")]
    entity: Option<EntityKind>,

    /// Index or hash of the entity.
    #[arg(long, requires = "entity")]
    id: Option<String>,

    /// Collective owning the proposal (council or technical-committee).
    #[arg(long, value_parser = parse_collective)]
    collective: Option<CollectiveName>,
}

/// Parse collective name from string.
fn parse_collective(s: &str) -> Result<CollectiveName, String> {
    match s.to_lowercase().as_str() {
        "council" => Ok(CollectiveName::Council),
        "technical-committee" | "technicalcommittee" => Ok(CollectiveName::TechnicalCommittee),
        _ => Err(format!(
            "Invalid collective '{}'. Use 'council' or 'technical-committee'.",
            s
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let ws_url = url::Url::parse(&cli.ws_url).context("Invalid WebSocket URL")?;
    if !matches!(ws_url.scheme(), "ws" | "wss") {
        bail!("WebSocket URL must use ws:// or wss://, got {}", ws_url);
    }

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 SUBSTRATE CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Herald");
    info!("📡 Connecting to Substrate node...");
    let substrate_client = SubstrateClient::connect(SubstrateClientConfig {
        ws_url: cli.ws_url.clone(),
    })
    .await
    .context("Failed to connect to Substrate node")?;
    let substrate_client = Arc::new(substrate_client);

    let runtime_version = substrate_client.runtime_version().await?;
    let head = substrate_client.latest_header().await?;
    info!(
        chain = %cli.chain,
        spec = %runtime_version.spec_name,
        runtime = runtime_version.spec_version,
        head = head.number,
        "🔗 Chain connected"
    );

    match cli.command {
        Command::Listen(args) => {
            listen(substrate_client, cli.chain, args, metrics_enabled, cli.metrics_port).await
        }
        Command::Fetch(args) => fetch(substrate_client, args).await,
    }
}

async fn listen(
    client: Arc<SubstrateClient>,
    chain: String,
    args: ListenArgs,
    metrics_enabled: bool,
    metrics_port: u16,
) -> Result<()> {
    let options = ListenerOptions {
        chain,
        skip_catchup: args.skip_catchup,
        archival: args.archival,
        start_block: args.start_block,
        verbose: args.verbose,
        max_batch_size: args.max_batch_size,
        enrich_concurrency: args.enrich_concurrency,
    };
    let offline_range = (args.start_block.is_some() || args.end_block.is_some()).then_some(
        DisconnectedRange {
            start_block: args.start_block,
            end_block: args.end_block,
        },
    );
    debug!(?offline_range, "Offline range");

    let handlers = HandlerChain::new().with(Arc::new(JsonLinesHandler::stdout()));
    let listener = Listener::new(client, options, handlers, Arc::new(StaticRange(offline_range)));

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ LISTENER START
    // ─────────────────────────────────────────────────────────────────────────
    let handle = tokio::select! {
        started = listener.start() => started.context("Failed to start listener")?,
        _ = shutdown_signal() => {
            info!("🛑 Shutdown requested during catch-up");
            return Ok(());
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Herald ready");
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    handle.unsubscribe();
    info!(last_block = ?handle.last_block_number(), "🛑 Shutdown complete");
    Ok(())
}

async fn fetch(client: Arc<SubstrateClient>, args: FetchArgs) -> Result<()> {
    let fetcher = StorageFetcher::new(client);

    let fetched = if !args.identities.is_empty() {
        fetcher.fetch_identities(&args.identities).await
    } else if let (Some(kind), Some(id)) = (args.entity, args.id.as_deref()) {
        fetcher.fetch_one(id, kind, args.collective).await
    } else {
        fetcher.fetch().await
    };
    let events = fetched.context("Failed to fetch chain state")?;

    let printer = JsonLinesHandler::stdout();
    for event in &events {
        printer
            .handle(event, None)
            .await
            .context("Failed to write event")?;
    }

    info!(count = events.len(), "✅ Fetch complete");
    Ok(())
}

/// Initialize tracing subscriber.
///
/// Logs go to stderr so stdout carries only events.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collective() {
        assert_eq!(parse_collective("Council"), Ok(CollectiveName::Council));
        assert_eq!(
            parse_collective("technical-committee"),
            Ok(CollectiveName::TechnicalCommittee)
        );
        assert!(parse_collective("senate").is_err());
    }

    #[test]
    fn test_cli_parses_listen_flags() {
        let cli = Cli::try_parse_from([
            "herald",
            "--chain",
            "kusama",
            "listen",
            "--archival",
            "--start-block",
            "100",
        ])
        .unwrap();

        assert_eq!(cli.chain, "kusama");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert!(args.archival);
        assert_eq!(args.start_block, Some(100));
        assert_eq!(args.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
    }

    #[test]
    fn test_cli_parses_fetch_identities() {
        let cli = Cli::try_parse_from(["herald", "fetch", "--identities", "a,b"]).unwrap();

        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.identities, vec!["a", "b"]);
        assert!(args.entity.is_none());
    }

    #[test]
    fn test_cli_fetch_entity_requires_id() {
        assert!(Cli::try_parse_from(["herald", "fetch", "--entity", "treasury-proposal"]).is_err());
        let cli = Cli::try_parse_from([
            "herald",
            "fetch",
            "--entity",
            "treasury-proposal",
            "--id",
            "4",
        ])
        .unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.entity, Some(EntityKind::TreasuryProposal));
    }
}
