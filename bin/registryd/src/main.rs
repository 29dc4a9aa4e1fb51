//! Issuer registry indexer daemon (registryd)
//!
//! Follows a single registry contract on an EVM chain, projects its issuer
//! lifecycle events (submitted, approved, rejected) into a local SQLite
//! database, and keeps a cursor so restarts resume where they left off.
//!
//! ## Usage
//!
//! ```bash
//! # Catch up from the cursor, then follow the head
//! registryd run --contract-address 0x... --rpc-url http://127.0.0.1:8545
//!
//! # One-shot catch-up to the current head
//! registryd backfill
//!
//! # Projected counts and ingestion progress as JSON
//! registryd status
//!
//! # Drop all projected state (requires --yes)
//! registryd reset --yes
//! ```
//!
//! Configuration resolves from defaults < YAML (`registryd.yaml`) < env
//! (`REGISTRYD_` prefix) < CLI flags.

mod config;
mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use registry_chain::{ChainClient, ChainError, HttpChainClient};
use registry_ingest::{
    BackfillOptions, Backfiller, IngestError, LiveIngestor, LiveOptions, PollOptions, Poller,
};
use registry_store::{
    ProgressTracker, Projector, QueryService, RegistryStore, SqliteRegistryStore,
};
use tracing_subscriber::{fmt, EnvFilter};

use config::{build_figment, AppConfig, DEFAULT_CONFIG_PATH};
use signals::Shutdown;

#[derive(Parser)]
#[command(name = "registryd")]
#[command(about = "Issuer registry indexer daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Catch up from the cursor, then follow the chain head
    Run(CommonArgs),
    /// Catch up to the current head and exit
    Backfill(CommonArgs),
    /// Print projected counts and ingestion progress as JSON
    Status(CommonArgs),
    /// Drop all projected state and the cursor
    Reset(ResetArgs),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Config YAML path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// SQLite database path override
    #[arg(long)]
    db_path: Option<String>,

    /// Log level override
    #[arg(long)]
    log_level: Option<String>,

    /// JSON-RPC endpoint override
    #[arg(long)]
    rpc_url: Option<String>,

    /// Registry contract address override
    #[arg(long)]
    contract_address: Option<String>,

    /// Contract deployment block override
    #[arg(long)]
    start_block: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ResetArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Skip the confirmation check
    #[arg(long)]
    yes: bool,
}

/// Resolve an AppConfig from: defaults < YAML < env vars < CLI flags.
fn resolve_config(common: &CommonArgs) -> AppConfig {
    let mut figment = build_figment(&common.config);

    // Apply CLI overrides (highest priority)
    if let Some(ref v) = common.db_path {
        figment = figment.merge(("storage.path", v.as_str()));
    }
    if let Some(ref v) = common.log_level {
        figment = figment.merge(("observability.log_level", v.as_str()));
    }
    if let Some(ref v) = common.rpc_url {
        figment = figment.merge(("chain.rpc_url", v.as_str()));
    }
    if let Some(ref v) = common.contract_address {
        figment = figment.merge(("chain.contract_address", v.as_str()));
    }
    if let Some(v) = common.start_block {
        figment = figment.merge(("chain.start_block", v));
    }

    figment.extract().expect("failed to extract config")
}

fn init_tracing(log_level: &str) {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = resolve_config(&args);
            init_tracing(&config.observability.log_level);
            config.validate().expect("invalid config");
            run(config).await;
        }
        Commands::Backfill(args) => {
            let config = resolve_config(&args);
            init_tracing(&config.observability.log_level);
            config.validate().expect("invalid config");
            backfill(config).await;
        }
        Commands::Status(args) => {
            let config = resolve_config(&args);
            init_tracing(&config.observability.log_level);
            status(config);
        }
        Commands::Reset(args) => {
            let config = resolve_config(&args.common);
            init_tracing(&config.observability.log_level);
            reset(config, args.yes);
        }
    }
}

fn open_store(config: &AppConfig) -> Arc<SqliteRegistryStore> {
    if let Some(parent) = Path::new(&config.storage.path).parent() {
        std::fs::create_dir_all(parent).expect("failed to create data directory");
    }
    Arc::new(SqliteRegistryStore::new(&config.storage.path).expect("failed to open registry store"))
}

struct Pipeline {
    client: Arc<dyn ChainClient>,
    store: Arc<SqliteRegistryStore>,
    projector: Arc<Projector>,
    progress: Arc<ProgressTracker>,
}

fn build_pipeline(config: &AppConfig) -> Pipeline {
    let store = open_store(config);
    let client: Arc<dyn ChainClient> = Arc::new(
        HttpChainClient::new(config.http_client_config()).expect("failed to build chain client"),
    );
    let projection_store: Arc<dyn RegistryStore> = store.clone();
    let projector = Arc::new(Projector::new(projection_store.clone()));
    let progress = Arc::new(ProgressTracker::new(
        projection_store,
        config.chain.start_block,
    ));
    Pipeline {
        client,
        store,
        projector,
        progress,
    }
}

/// Catch up from the cursor to the head seen at startup. Returns `false`
/// if interrupted by shutdown.
async fn catch_up(pipeline: &Pipeline, config: &AppConfig, shutdown: &Shutdown) -> bool {
    let head = pipeline
        .client
        .current_height()
        .await
        .expect("failed to fetch chain head");
    let mut backfiller = Backfiller::new(
        pipeline.client.clone(),
        pipeline.projector.clone(),
        pipeline.progress.clone(),
        BackfillOptions {
            batch_size: config.ingest.batch_size,
            batch_delay: config.batch_delay(),
            retry: config.retry_strategy(),
        },
        shutdown.subscribe(),
    );
    backfiller.run(head).await.expect("backfill failed")
}

async fn run(config: AppConfig) {
    tracing::info!(
        contract = %config.chain.contract_address,
        rpc = %config.chain.rpc_url,
        db = %config.storage.path,
        "registryd starting"
    );

    let pipeline = build_pipeline(&config);
    let shutdown = Shutdown::listen();

    if !catch_up(&pipeline, &config, &shutdown).await {
        tracing::info!("interrupted during catch-up");
        return;
    }

    // Follow mode: push where the transport supports it, polling otherwise.
    let mut live = LiveIngestor::new(
        pipeline.client.clone(),
        pipeline.projector.clone(),
        LiveOptions::default(),
        shutdown.subscribe(),
    );
    match live.run().await {
        Ok(()) => {}
        Err(IngestError::Chain(ChainError::SubscriptionsUnsupported)) => {
            tracing::info!("transport has no subscriptions, following by polling");
            let mut poller = Poller::new(
                pipeline.client.clone(),
                pipeline.projector.clone(),
                pipeline.progress.clone(),
                PollOptions {
                    batch_size: config.ingest.batch_size,
                    poll_interval: config.poll_interval(),
                    retry_interval: config.poll_retry_interval(),
                },
                shutdown.subscribe(),
            );
            poller.run().await.expect("polling failed");
        }
        Err(e) => {
            tracing::error!(error = %e, "live ingestion failed");
        }
    }

    tracing::info!("shutdown complete");
}

async fn backfill(config: AppConfig) {
    let pipeline = build_pipeline(&config);
    let shutdown = Shutdown::listen();

    if catch_up(&pipeline, &config, &shutdown).await {
        let cursor = pipeline.store.cursor().expect("failed to read cursor");
        tracing::info!(cursor = ?cursor, "backfill finished");
    } else {
        tracing::info!("interrupted during backfill");
    }
}

fn status(config: AppConfig) {
    let store: Arc<dyn RegistryStore> = open_store(&config);
    let query = QueryService::new(store);
    query.ping().expect("registry store unhealthy");
    let overview = query.overview().expect("failed to read registry state");
    let json = serde_json::to_string_pretty(&overview).expect("overview serializes");
    println!("{json}");
}

fn reset(config: AppConfig, yes: bool) {
    if !yes {
        eprintln!(
            "reset drops all projected state and the cursor in {}; re-run with --yes to confirm",
            config.storage.path
        );
        std::process::exit(2);
    }
    let store = open_store(&config);
    store.reset().expect("failed to reset registry store");
    tracing::info!(db = %config.storage.path, "registry store reset, next run re-indexes from the deployment block");
}
