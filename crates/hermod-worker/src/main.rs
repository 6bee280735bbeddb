//! Hermod worker process entrypoint (SPEC_FULL §A.3, §D).
//!
//! Grounded on `crates/worker/src/main.rs`'s shape: init telemetry,
//! load config, build the long-running components, then
//! `tokio::select!` the main run future against `ctrl_c` for graceful
//! shutdown. The lease manager / registry / publisher loops themselves
//! are each driven by `durable::worker::pool::WorkerPool`-style
//! `tokio::select!` loops inside their own crates; this binary only
//! spawns and cancels them.

mod config;
mod connectors;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use hermod_crypto::Vault;
use hermod_lease::{LeaseManager, LeaseManagerConfig};
use hermod_outbox::{Publisher, PublisherConfig};
use hermod_registry::{Registry, RegistryConfig};
use hermod_runtime::InstanceConfig;
use hermod_schema::SchemaRegistry;
use hermod_store::{MetadataStore, PostgresMetadataStore};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::HermodConfig;
use crate::connectors::UnimplementedResolver;
use crate::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let _telemetry_guard = init_telemetry(TelemetryConfig::from_env());

    tracing::info!("hermod-worker starting");

    let config = HermodConfig::from_env().context("failed to load configuration")?;
    let vault = Vault::from_env().context("HERMOD_MASTER_KEY must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the metadata store")?;

    let store = PostgresMetadataStore::new(pool, vault);
    store
        .migrate()
        .await
        .context("failed to run metadata store self-migration")?;
    let store: Arc<dyn MetadataStore> = Arc::new(store);

    let schema_registry = Arc::new(SchemaRegistry::new(store.clone()));
    let resolver = Arc::new(UnimplementedResolver);

    let (lease_events_tx, lease_events_rx) = mpsc::channel(256);
    let lease_manager = Arc::new(
        LeaseManager::new(
            store.clone(),
            config.worker_id.clone(),
            config.workspace_ids.clone(),
            LeaseManagerConfig {
                heartbeat_interval: config.heartbeat_interval,
                lease_ttl: config.lease_ttl,
                cpu_budget_millis: config.cpu_budget_millis,
                memory_budget_mb: config.memory_budget_mb,
            },
            lease_events_tx,
        )
        .context("invalid lease manager configuration")?,
    );

    let registry = Arc::new(Registry::new(
        config.worker_id.clone(),
        store.clone(),
        schema_registry,
        resolver.clone(),
        RegistryConfig {
            instance: InstanceConfig {
                channel_capacity: config.channel_capacity,
                shutdown_grace: config.shutdown_grace,
                watchdog_interval: config.watchdog_interval,
            },
            reconcile_interval: config.reconcile_interval,
        },
    ));

    let publisher = Arc::new(Publisher::new(
        store.clone(),
        resolver,
        PublisherConfig {
            batch_size: config.publisher_batch_size,
            retry_interval: config.publisher_interval,
            ..PublisherConfig::default()
        },
        config.worker_id.clone(),
    ));

    let shutdown = CancellationToken::new();

    let lease_task = {
        let lease_manager = lease_manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { lease_manager.run(shutdown).await })
    };

    let registry_task = {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { registry.run(lease_events_rx, shutdown).await })
    };

    let publisher_task = {
        let publisher = publisher.clone();
        let shutdown = shutdown.clone();
        let interval = config.publisher_interval;
        let reclaim_interval = config.reclaim_interval;
        let claim_ttl = config.outbox_claim_ttl;
        tokio::spawn(async move {
            run_publisher_loop(publisher, interval, reclaim_interval, claim_ttl, shutdown).await
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    shutdown.cancel();
    let _ = tokio::join!(lease_task, registry_task, publisher_task);

    tracing::info!("hermod-worker shutdown complete");
    Ok(())
}

/// Drives the Outbox Publisher's claim/write pass and the stale-claim
/// reclamation sweep (spec §4.5, SPEC_FULL §B) on their own intervals
/// until `shutdown` fires. `Publisher` exposes single-shot operations
/// (`run_once`, `reclaim_stale`); looping them is the binary's job,
/// same split as `LeaseManager::tick` vs `LeaseManager::run`.
async fn run_publisher_loop(
    publisher: Arc<Publisher>,
    publish_interval: std::time::Duration,
    reclaim_interval: std::time::Duration,
    claim_ttl: chrono::Duration,
    shutdown: CancellationToken,
) {
    let mut publish_ticker = tokio::time::interval(publish_interval);
    let mut reclaim_ticker = tokio::time::interval(reclaim_interval);

    loop {
        tokio::select! {
            _ = publish_ticker.tick() => {
                if let Err(err) = publisher.run_once().await {
                    tracing::warn!(?err, "outbox publish pass failed");
                }
            }
            _ = reclaim_ticker.tick() => {
                if let Err(err) = publisher.reclaim_stale(claim_ttl).await {
                    tracing::warn!(?err, "stale outbox reclamation sweep failed");
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
