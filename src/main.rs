//! Apex Genesis - Connection Monitor
//!
//! Headless driver for the connection manager: loads configuration, probes
//! every registered connection, and logs status changes until Ctrl-C.

use anyhow::Context;
use apex_genesis::connection::TransportKind;
use apex_genesis::domain::{AppConfig, default_config_path, load_config, save_config};
use apex_genesis::helpers::{init_logging, is_development};
use apex_genesis::services::probe::{
    DatastoreProber, HttpApiProber, ProberRegistry, StorageProber, WebSocketProber,
};
use apex_genesis::services::{ConnectionManager, ManagerConfig, ManagerEvent, NetworkMonitor};
use apex_genesis::utils::{FileStore, KeyValueStore};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();
    tracing::info!(
        "Starting Apex Genesis connection monitor ({})",
        if is_development() { "development" } else { "release" }
    );

    let config = load(std::env::args().nth(1).map(PathBuf::from))?;
    let manager = ConnectionManager::new(
        config.connections.clone(),
        build_probers(&config)?,
        ManagerConfig::from_settings(&config.manager),
    );

    // Held until shutdown; the logging callbacks live as long as the manager
    let _subscriptions: Vec<_> = manager
        .entries()
        .iter()
        .filter_map(|entry| {
            let name = entry.display_name.clone();
            manager.on_connection_change(&entry.id, move |status| {
                tracing::info!("{} is now {}", name, status);
            })
        })
        .collect();

    manager.start();

    let network = config
        .network
        .enabled
        .then(|| NetworkMonitor::new(config.network.clone()).spawn(manager.clone()));

    let summary = {
        let manager = manager.clone();
        let period = ManagerConfig::from_settings(&config.manager).health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match serde_json::to_string(&manager.snapshots()) {
                    Ok(json) => tracing::info!("Connections: {}", json),
                    Err(e) => tracing::warn!("Failed to serialize snapshots: {}", e),
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    manager.handle(ManagerEvent::Teardown);
    summary.abort();
    if let Some(network) = network {
        network.abort();
    }
    Ok(())
}

/// Load the config from `path`, or from the platform config dir, writing
/// the defaults there on first run
fn load(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = match path {
        Some(path) => path,
        None => {
            let path = default_config_path().context("Failed to locate config directory")?;
            if !path.exists() {
                save_config(&path, &AppConfig::default())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!("Wrote default config to {}", path.display());
            }
            path
        }
    };

    let mut config =
        load_config(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    tracing::info!(
        "Loaded {} connections from {}",
        config.connections.len(),
        path.display()
    );
    Ok(config)
}

fn build_probers(config: &AppConfig) -> anyhow::Result<ProberRegistry> {
    let mut probers = ProberRegistry::new()
        .with(
            TransportKind::HostedDatastore,
            DatastoreProber::new(config.datastore.clone()),
        )
        .with(
            TransportKind::HttpApi,
            HttpApiProber::new(config.api.fallback_path.clone()),
        )
        .with(TransportKind::Websocket, WebSocketProber::new());

    if config.uses(TransportKind::LocalStorage) {
        let store = match &config.storage.dir {
            Some(dir) => FileStore::open(dir.clone()),
            None => FileStore::open_default(),
        }
        .context("Failed to open local storage")?;
        tracing::info!("Local storage at {}", store.dir().display());
        let store: Arc<dyn KeyValueStore> = Arc::new(store);
        probers.register(TransportKind::LocalStorage, StorageProber::new(store));
    }

    Ok(probers)
}
