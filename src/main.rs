//! telemetry-scorer - streaming anomaly scoring service
//!
//! # Usage
//!
//! ```bash
//! # Serve the ingest API (default)
//! telemetry-scorer --addr 0.0.0.0:8080
//!
//! # Consume delivery events from stdin
//! load-generator --count 1000 | telemetry-scorer --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `SCORER_CONFIG`: Path to the TOML config file
//! - `SCORING_ENDPOINT_URL`, `STORE_PATH`, `THRESHOLD`: Config overrides
//! - `RUST_LOG`: Logging level (default: info)
//! - `LOG_FORMAT`: Set to `json` for JSON log lines

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use telemetry_scorer::api::{self, ApiState};
use telemetry_scorer::pipeline::{DeliveryLoop, Dispatcher, StdinSource};
use telemetry_scorer::{HttpScoringClient, InMemoryRecordStore, RecordStore, ScorerConfig, SledRecordStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "telemetry-scorer")]
#[command(about = "Streaming anomaly scoring for device telemetry")]
#[command(version)]
struct CliArgs {
    /// Consume delivery events (one JSON per line) from stdin instead of
    /// serving the ingest API
    #[arg(long)]
    stdin: bool,

    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Config file path (skips the SCORER_CONFIG / ./scorer.toml search)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep records in memory only (nothing is written to disk)
    #[arg(long)]
    in_memory: bool,
}

/// Identifies which supervised task completed.
#[derive(Debug)]
enum TaskName {
    HttpServer,
    DeliveryLoop,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::DeliveryLoop => write!(f, "DeliveryLoop"),
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the configured record store. The sled handle is returned separately
/// so it can be flushed on shutdown.
fn open_store(
    config: &ScorerConfig,
    in_memory: bool,
) -> Result<(Arc<dyn RecordStore>, Option<Arc<SledRecordStore>>)> {
    if in_memory {
        info!("Record store: in-memory (records are lost on exit)");
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        return Ok((store, None));
    }

    if let Some(parent) = config.store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let sled = Arc::new(
        SledRecordStore::open(&config.store.path, config.store.flush_every_write)
            .with_context(|| format!("Failed to open record store at {}", config.store.path.display()))?,
    );
    let store: Arc<dyn RecordStore> = sled.clone();
    Ok((store, Some(sled)))
}

// ============================================================================
// Tasks
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the stdin delivery loop into the JoinSet.
fn spawn_delivery_loop(
    task_set: &mut JoinSet<Result<TaskName>>,
    dispatcher: Arc<Dispatcher>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[DeliveryLoop] Task starting");
        let mut source = StdinSource::stdin();
        let stats = DeliveryLoop::new(dispatcher, cancel_token).run(&mut source).await;
        if stats.batches_abandoned > 0 {
            error!(
                abandoned = stats.batches_abandoned,
                "[DeliveryLoop] Some batches still had retryable failures after the last attempt"
            );
        }
        Ok(TaskName::DeliveryLoop)
    });
}

/// Wait for tasks to complete, cancelling everything on the first failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let cancelled tasks finish their shutdown
    while let Some(result) = task_set.join_next().await {
        if let Ok(Err(e)) = result {
            error!("Supervisor: Task failed during shutdown: {}", e);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let mut config = ScorerConfig::load_with(args.config.as_deref())
        .context("Failed to load scorer configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    let config = Arc::new(config);

    info!("Telemetry Scorer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        endpoint = %config.scoring.endpoint_url,
        threshold = config.decision.threshold,
        "Scoring configuration"
    );

    let (store, durable) = open_store(&config, args.in_memory)?;
    let scorer = Arc::new(
        HttpScoringClient::new(&config.scoring).context("Failed to build scoring client")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), scorer, store.clone()));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if args.stdin {
        info!("Input: stdin (one delivery event per line)");
        spawn_delivery_loop(&mut task_set, Arc::clone(&dispatcher), cancel_token.clone());
    } else {
        let listener = tokio::net::TcpListener::bind(&config.server.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
        api::handlers::log_routes(&listener.local_addr()?);

        let app = api::create_app(ApiState::new(Arc::clone(&dispatcher), store));
        spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    }

    run_supervisor(&mut task_set, cancel_token).await?;

    if let Some(sled) = durable {
        sled.flush().context("Failed to flush record store")?;
        info!(size_bytes = sled.size_bytes(), "Record store flushed");
    }
    info!("{}", dispatcher.stats().snapshot());
    Ok(())
}
