use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mqtt2db_api::StorageBackend;
use mqtt2db_broker_mqtt::BrokerSession;
use mqtt2db_engine::{Reconciler, SchemaRegistry, dispatch};
use mqtt2db_storage_memory::MemoryStorage;
use mqtt2db_storage_mysql::MySqlStorage;

use crate::config::{self, RunArgs};
use crate::error::ServerError;

/// How long shutdown waits for sessions and the dispatch loop to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: RunArgs) -> Result<(), ServerError> {
    tracing::info!(config = %args.config, dry_run = args.dry_run, "mqtt2db-server starting");

    // --- Load config ---
    let config = config::load(&args.config)?;
    for warning in config.validate()? {
        tracing::warn!(%warning, "config");
    }
    if config.brokers.is_empty() {
        return Err(ServerError::NoComponents("brokers"));
    }
    if config.subscriptions.is_empty() {
        return Err(ServerError::NoComponents("subscriptions"));
    }
    tracing::info!(
        databases = config.databases.len(),
        tables = config.tables.len(),
        subscriptions = config.subscriptions.len(),
        brokers = config.brokers.len(),
        bucket = ?config.bucket,
        "loaded config"
    );

    // --- Storage backends, one per database ---
    let mut backends: HashMap<String, Arc<dyn StorageBackend>> = HashMap::new();
    let mut mysql: Vec<Arc<MySqlStorage>> = Vec::new();
    for db in &config.databases {
        if args.dry_run {
            tracing::info!(db = %db.name(), "dry run: using in-memory storage");
            backends.insert(db.name().to_string(), Arc::new(MemoryStorage::new()));
            continue;
        }
        let storage = MySqlStorage::connect(db).await.map_err(|source| ServerError::Storage {
            db: db.name().to_string(),
            source,
        })?;
        let storage = Arc::new(storage);
        mysql.push(storage.clone());
        backends.insert(db.name().to_string(), storage);
    }

    let schema = SchemaRegistry::new(&config, &backends)?;
    tracing::info!(tables = ?schema.table_refs(), "schema registry ready");
    let reconciler = Arc::new(Reconciler::from_config(&config, schema));

    // --- Dispatch loop ---
    let token = CancellationToken::new();
    let (sender, rx) = dispatch::channel(config.dispatch.buffer, config.dispatch.overflow);
    let dispatcher = dispatch::spawn(reconciler.clone(), rx, token.clone());

    // --- Broker sessions ---
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    for broker in &config.brokers {
        let topics = reconciler.topics().topics_for(&broker.name);
        if topics.is_empty() {
            tracing::warn!(broker = %broker.name, "no subscriptions, not connecting");
            continue;
        }
        let session = BrokerSession::new(broker.clone(), topics, sender.clone());
        sessions.push(session.spawn(token.clone()));
    }
    // The dispatch loop ends once every session has dropped its sender.
    drop(sender);

    tracing::info!(sessions = sessions.len(), "server ready");

    // --- Wait for Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    token.cancel();

    for h in sessions {
        if let Err(e) = tokio::time::timeout(DRAIN_TIMEOUT, h).await {
            tracing::warn!(error = %e, "broker session did not stop in time");
        }
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, dispatcher).await {
        Ok(Ok(stats)) => tracing::info!(?stats, "dispatch drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "dispatch task failed"),
        Err(_) => tracing::warn!("dispatch did not drain in time"),
    }

    for storage in &mysql {
        storage.close().await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}
