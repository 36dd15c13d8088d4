//! Flowlens Server
//!
//! Projects Superfluid payment flows of one app contract into a
//! queryable state and serves it over HTTP and WebSocket.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use flowlens_core::chain::{AlloyChainClient, ChainClient};
use flowlens_core::entities::{InMemorySnapshotStore, SnapshotStore};
use flowlens_core::framework::DatabaseProcessor;
use flowlens_core::processors::ProjectorService;
use server::{build_router, run_server};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Flowlens - off-chain projection of streaming payment flows
#[derive(Parser, Debug)]
#[command(name = "flowlens-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./flowlens-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep snapshots in memory only; no database is used
    #[arg(long, default_value = "false", conflicts_with = "migrate")]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting flowlens-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let chain: Arc<dyn ChainClient> = Arc::new(AlloyChainClient::connect(
        loaded_config.rpc_url.clone(),
        loaded_config.projector.app_address,
        loaded_config.host_address,
    ));

    // Snapshot store: Postgres unless running ephemeral
    let (store, db_pool): (Arc<dyn SnapshotStore>, Option<PgPool>) = if args.ephemeral {
        tracing::warn!("Running ephemeral: snapshots are not persisted");
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        (store, None)
    } else {
        let database_url = get_database_url().map_err(|e| {
            tracing::error!("DATABASE_URL environment variable not set");
            e
        })?;

        tracing::info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
        tracing::info!("Database connection established");

        if args.migrate {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    e
                })?;
            tracing::info!("Migrations completed successfully");
        }

        let store: Arc<dyn SnapshotStore> = Arc::new(DatabaseProcessor::new(db_pool.clone()));
        (store, Some(db_pool))
    };

    // Start the projector
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, projector_task) =
        ProjectorService::start(loaded_config.projector, chain, store, shutdown_rx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to start projector: {}", e);
                e
            })?;

    let router = build_router(AppState::new(handle));

    tracing::info!("Starting HTTP server on {}", loaded_config.listen);
    let result = run_server(router, loaded_config.listen).await;

    // Stop subscriptions and persist the final state
    tracing::info!("Stopping projector...");
    let _ = shutdown_tx.send(true);
    match projector_task.await {
        Ok(Ok(())) => tracing::info!("Projector stopped"),
        Ok(Err(e)) => tracing::error!("Projector stopped with error: {}", e),
        Err(e) => tracing::error!("Projector task panicked: {}", e),
    }

    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
