//! Farebid Server
//!
//! Fare negotiation back office: riders and drivers haggle over a fare
//! inside a pricing band until one side accepts.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::file::{CacheConfig, PricingConfig};
use config::{ConfigLoader, get_database_url};
use farebid_core::cache::{MemorySnapshotCache, RedisSnapshotCache, SnapshotCache};
use farebid_core::clock::SystemClock;
use farebid_core::engine::{EngineComponents, SessionEngine};
use farebid_core::events::bus_channel;
use farebid_core::pricing::{HttpPricingOracle, PricingOracle, StaticPricingOracle};
use farebid_core::processors::{BusRelay, ExpirySweeper};
use farebid_core::push::PushHub;
use farebid_core::store::PgSessionStore;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Farebid - fare negotiation session engine
#[derive(Parser, Debug)]
#[command(name = "farebid-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./farebid.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FAREBID_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting farebid-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    tracing::info!(path = ?args.config, "Configuration loaded");

    let listen_addr = loaded_config.server.listen;
    let push_buffer = loaded_config.server.push_buffer;
    let pricing = build_pricing(loaded_config.pricing.clone())?;
    let cache = build_cache(loaded_config.cache.clone()).await?;
    let shared_config = loaded_config.into_shared();

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
            tracing::error!(error = %e, "Failed to connect to database");
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Engine and its collaborators
    let (bus_tx, bus_rx) = bus_channel();
    let engine = SessionEngine::new(EngineComponents {
        store: Arc::new(PgSessionStore::new(db_pool.clone())),
        cache,
        pricing,
        clock: Arc::new(SystemClock),
        push: Arc::new(PushHub::new(push_buffer)),
        bus: bus_tx,
        policy: shared_config.policy.clone(),
    });

    // Background processors
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(engine.clone());
    let sweeper_handle = tokio::spawn(
        sweeper.run(shutdown_rx.clone(), shared_config.policy.subscribe()),
    );
    let relay = BusRelay::new(shared_config.bus.clone());
    let relay_handle = tokio::spawn(relay.run(shutdown_rx, bus_rx));

    let state = AppState::new(engine, shared_config);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader)?;

    let router = build_router(state);

    tracing::info!(addr = %listen_addr, "Starting HTTP server");
    let result = run_server(router, listen_addr).await;

    // Stop background work before closing the pool it depends on.
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    for (name, handle) in [("sweeper", sweeper_handle), ("bus relay", relay_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(processor = name, error = %e, "Processor task failed");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

fn build_pricing(config: PricingConfig) -> anyhow::Result<Arc<dyn PricingOracle>> {
    Ok(match config {
        PricingConfig::Static(table) => {
            tracing::info!(ride_types = table.ride_types.len(), currency = %table.currency, "Using static pricing table");
            Arc::new(StaticPricingOracle::new(table))
        }
        PricingConfig::Http(http) => {
            tracing::info!(url = %http.url, "Using HTTP pricing oracle");
            Arc::new(HttpPricingOracle::new(http)?)
        }
    })
}

async fn build_cache(config: CacheConfig) -> anyhow::Result<Arc<dyn SnapshotCache>> {
    Ok(match config {
        CacheConfig::Memory => {
            tracing::info!("Using in-process snapshot cache");
            Arc::new(MemorySnapshotCache::new())
        }
        CacheConfig::Redis(redis) => {
            tracing::info!(prefix = %redis.key_prefix, "Connecting to redis snapshot cache...");
            let cache = RedisSnapshotCache::connect(redis).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to redis");
                e
            })?;
            Arc::new(cache)
        }
    })
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
