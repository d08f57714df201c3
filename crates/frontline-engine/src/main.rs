//! Frontline service binary.
//!
//! Wires the live state machines to their collaborators: the NATS event
//! feed, the HTTP snapshot source, `PostgreSQL` persistence, the reference
//! cache, and the read API. Runs until interrupted, then shuts down in
//! order so that open sessions reach storage.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `frontline-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Connect to Dragonfly, falling back to an in-process cache
//! 5. Create the snapshot client
//! 6. Load the facility catalog
//! 7. Build the core state machines
//! 8. Restore alerts still running from storage
//! 9. Start persistence, reconciliation, and the alert sweep
//! 10. Connect to NATS and start the event feed
//! 11. Start the read API
//! 12. Wait for Ctrl-C, then shut down

mod error;
mod http_snapshot;
mod nats_events;
mod pg_sink;
mod populate;

use std::path::Path;
use std::sync::Arc;

use frontline_core::config::LogFormat;
use frontline_core::{Clock, FrontlineConfig, FrontlineCore, MemoryCache, Runtime, SystemClock};
use frontline_db::{DragonflyCache, PostgresConfig, PostgresPool};
use frontline_observer::{AppState, ServerConfig};
use frontline_world::FacilityCatalog;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::http_snapshot::HttpSnapshotSource;
use crate::nats_events::NatsEventFeed;
use crate::pg_sink::PgRecordSink;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step fails. Failures after startup are
/// logged by the task that hits them.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = FrontlineConfig::from_file_or_default(Path::new("frontline-config.yaml"))?;

    // 2. Initialize structured logging.
    init_logging(&config)?;
    info!(
        observer_port = config.infrastructure.observer_port,
        instability_threshold = config.alerts.instability_threshold,
        min_population = config.alerts.min_population,
        reconcile_interval_secs = config.reconciliation.interval_secs,
        "frontline-engine starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 3. Connect to PostgreSQL.
    let pool = PostgresPool::connect(&PostgresConfig::new(&config.infrastructure.postgres_url)).await?;
    pool.run_migrations().await?;
    info!("PostgreSQL connected, migrations applied");

    // 4-6. Reference cache, snapshot client, facility catalog.
    let source = HttpSnapshotSource::new(&config.infrastructure.snapshot_url)?;
    let catalog = load_catalog(&config, &source, &pool, &clock).await;

    // 7. Build the core.
    let (core, queue) = FrontlineCore::new(config.clone(), catalog, Arc::clone(&clock));

    // 8. Restore alerts that were running when the process last stopped.
    let now = clock.now();
    let finalized = pool.alerts().finalize_expired(now).await?;
    let unfinished = pool.alerts().get_unfinished(now).await?;
    let restored = core.restore_alerts(unfinished);
    info!(finalized, restored, "alert state recovered");

    // 9. Start background loops.
    let runtime = Runtime::start(core, queue, source, PgRecordSink::new(pool.clone()));
    let core = runtime.core().clone();
    info!("persistence, reconciliation, and alert sweep started");

    // 10. Connect the event feed.
    let feed = NatsEventFeed::connect(&config.infrastructure.nats_url).await?;
    let feed_handle = tokio::spawn(feed.run(Arc::clone(&core.router), Arc::clone(&core.shutdown)));

    // 11. Start the read API.
    let server_config = ServerConfig {
        port: config.infrastructure.observer_port,
        ..ServerConfig::default()
    };
    let app_state = Arc::new(AppState::new(&core, Some(pool.clone())));
    let shutdown = Arc::clone(&core.shutdown);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = frontline_observer::start_server(&server_config, app_state, shutdown).await {
            error!(error = %e, "read API failed");
        }
    });

    // 12. Run until interrupted.
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
    }

    let closed = runtime.shutdown().await;
    if let Err(e) = feed_handle.await {
        warn!(error = %e, "event feed task ended abnormally");
    }
    if let Err(e) = server_handle.await {
        warn!(error = %e, "read API task ended abnormally");
    }
    pool.close().await;

    info!(sessions_closed = closed, "frontline-engine shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(config: &FrontlineConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let result = match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };
    result.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

/// Load the catalog through Dragonfly, or an in-process cache when
/// Dragonfly is unreachable.
async fn load_catalog(
    config: &FrontlineConfig,
    source: &HttpSnapshotSource,
    pool: &PostgresPool,
    clock: &Arc<dyn Clock>,
) -> FacilityCatalog {
    let ttl = config.cache.reference_ttl();
    match DragonflyCache::connect(&config.infrastructure.dragonfly_url).await {
        Ok(cache) => {
            info!("Dragonfly connected");
            let (catalog, _) = populate::load_catalog(&cache, source, Some(pool), ttl).await;
            cache.quit().await;
            catalog
        }
        Err(e) => {
            warn!(error = %e, "Dragonfly unavailable, using in-process reference cache");
            let cache = MemoryCache::new(Arc::clone(clock));
            let (catalog, _) = populate::load_catalog(&cache, source, Some(pool), ttl).await;
            catalog
        }
    }
}
