//! Gatehouse server
//!
//! Serves the authentication API over PostgreSQL + Redis, or entirely in
//! memory for local development.
//!
//! # Usage
//!
//! ```bash
//! gatehouse-server --config config/production.toml
//! gatehouse-server --storage memory --log-format json
//! GATEHOUSE__AUTH__JWT__ACCESS_SECRET=... gatehouse-server
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatehouse_api::{create_router, AppState};
use gatehouse_db::{CacheBackend, Database, SignInHistoryRepository};

use crate::config::{LoggingConfig, ServerConfig, StorageKind};

/// Gatehouse authentication server
#[derive(Parser, Debug)]
#[command(name = "gatehouse-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "GATEHOUSE_CONFIG")]
    config: Option<String>,

    #[arg(long, env = "GATEHOUSE_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "GATEHOUSE_PORT")]
    port: Option<u16>,

    /// Log level or `EnvFilter` directive
    #[arg(long, env = "GATEHOUSE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "GATEHOUSE_LOG_FORMAT")]
    log_format: Option<String>,

    #[arg(long, value_enum, env = "GATEHOUSE_STORAGE")]
    storage: Option<StorageKind>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        if let Some(url) = self.database_url {
            config.database.postgres_url = url;
        }
        if let Some(url) = self.redis_url {
            config.database.redis_url = url;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    init_logging(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Gatehouse");

    let state = Arc::new(init_state(&config).await?);
    let app = create_router(state.clone(), config.api.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    let maintenance = tokio::spawn(run_maintenance(state.clone(), config.clone(), stop_rx));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, storage = ?config.storage, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = stop_tx.send(true);
    if let Err(e) = maintenance.await {
        warn!(error = %e, "Maintenance task ended abnormally");
    }
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }
    Ok(())
}

async fn init_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let state = match config.storage {
        StorageKind::Memory => {
            warn!("In-memory storage: users and tokens are lost on restart");
            AppState::in_memory(config.auth.clone())?
        }
        StorageKind::Postgres => {
            let database = Database::connect(&config.database).await?;
            let health = database.health_check().await;
            if !health.healthy {
                anyhow::bail!(
                    "storage health check failed (postgres: {}, redis: {})",
                    health.postgres,
                    health.redis
                );
            }
            AppState::from_database(database, config.auth.clone())?
        }
    };
    state
        .store
        .ensure_sign_in_partitions(Utc::now().year())
        .await
        .context("failed to prepare sign-in history partitions")?;
    Ok(state)
}

/// One maintenance pass: revocation sets, sign-in history partitions and
/// retention, expired cache entries
async fn maintain(state: &AppState, config: &ServerConfig) {
    if let Err(e) = state.auth.collect_garbage().await {
        error!(error = %e, "Revocation cleanup failed");
    }

    let year = Utc::now().year();
    if let Err(e) = state.store.ensure_sign_in_partitions(year).await {
        error!(error = %e, year, "Sign-in history partition setup failed");
    }

    let cutoff = year - config.maintenance.history_retention_years;
    match state.store.prune_sign_ins_before(cutoff).await {
        Ok(0) => {}
        Ok(removed) => info!(removed, before_year = cutoff, "Pruned sign-in history"),
        Err(e) => error!(error = %e, "Sign-in history pruning failed"),
    }

    match state.cache.purge_expired().await {
        Ok(0) => {}
        Ok(evicted) => debug!(evicted, "Evicted expired cache entries"),
        Err(e) => error!(error = %e, "Cache eviction failed"),
    }
}

/// Run [`maintain`] on every garbage-collection tick until stopped
async fn run_maintenance(
    state: Arc<AppState>,
    config: ServerConfig,
    mut stop: watch::Receiver<bool>,
) {
    let period = config.auth.blacklist.gc_interval.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        maintain(&state, &config).await;
    }
}

/// Resolve on Ctrl+C or SIGTERM; axum then drains in-flight requests
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
