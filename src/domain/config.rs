//! Config - Application Configuration
//!
//! TOML configuration for the connection monitor, stored as `config.toml`
//! in the platform config directory unless a path is given.

use crate::connection::{ConnectionEntry, TransportKind};
use crate::constants::{
    API_FALLBACK_PATH, CONFIG_FILE_NAME, DATASTORE_COLLECTION, HEALTH_CHECK_INTERVAL_SECS,
    NETWORK_CHECK_INTERVAL_SECS, NETWORK_CHECK_TARGET, NETWORK_CHECK_TIMEOUT_MS,
    RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS, STARTUP_STAGGER_MS,
};
use crate::error::{Error, Result};
use crate::helpers::get_or_create_config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable overriding the datastore URL
pub const ENV_DATASTORE_URL: &str = "SUPABASE_URL";
/// Environment variable overriding the datastore API key
pub const ENV_DATASTORE_KEY: &str = "SUPABASE_ANON_KEY";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scheduling and backoff
    pub manager: ManagerSettings,
    /// Hosted datastore access
    pub datastore: DatastoreConfig,
    /// HTTP API probe options
    pub api: ApiSettings,
    /// Reachability monitor
    pub network: NetworkSettings,
    /// Local storage location
    pub storage: StorageSettings,
    /// Registered connections, in registration order
    pub connections: Vec<ConnectionEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            manager: ManagerSettings::default(),
            datastore: DatastoreConfig::default(),
            api: ApiSettings::default(),
            network: NetworkSettings::default(),
            storage: StorageSettings::default(),
            connections: ConnectionEntry::defaults(),
        }
    }
}

/// Manager scheduling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Backoff base delay
    pub base_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
    /// Interval between health-check sweeps
    pub health_check_interval_secs: u64,
    /// Per-entry stagger of the first connect attempt
    pub startup_stagger_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: RETRY_BASE_DELAY_MS,
            max_delay_ms: RETRY_MAX_DELAY_MS,
            health_check_interval_secs: HEALTH_CHECK_INTERVAL_SECS,
            startup_stagger_ms: STARTUP_STAGGER_MS,
        }
    }
}

/// Hosted datastore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Project URL (e.g., "https://xyz.supabase.co")
    pub url: Option<String>,
    /// Anonymous API key
    pub api_key: Option<String>,
    /// Collection read by the probe
    pub collection: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection: DATASTORE_COLLECTION.to_string(),
        }
    }
}

/// HTTP API probe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Resource probed when `/health` is unreachable
    pub fallback_path: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            fallback_path: API_FALLBACK_PATH.to_string(),
        }
    }
}

/// Network reachability monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub enabled: bool,
    /// `host:port` reached over TCP
    pub target: String,
    pub interval_secs: u64,
    pub timeout_ms: u64,
}

impl NetworkSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            target: NETWORK_CHECK_TARGET.to_string(),
            interval_secs: NETWORK_CHECK_INTERVAL_SECS,
            timeout_ms: NETWORK_CHECK_TIMEOUT_MS,
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Storage directory; the platform data directory when absent
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Reject registries the manager cannot run
    pub fn validate(&self) -> Result<()> {
        if self.connections.is_empty() {
            return Err(invalid("At least one connection must be configured"));
        }

        let mut seen = HashSet::new();
        for entry in &self.connections {
            if entry.id.trim().is_empty() {
                return Err(invalid("Connection id must not be empty"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(invalid(format!("Duplicate connection id: {}", entry.id)));
            }
            if entry.timeout_ms == 0 {
                return Err(invalid(format!("Connection {} has a zero timeout", entry.id)));
            }
            let has_endpoint = entry.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty());
            if entry.transport.requires_endpoint() && !has_endpoint {
                return Err(invalid(format!(
                    "Connection {} ({}) requires an endpoint",
                    entry.id, entry.transport
                )));
            }
        }

        if self.manager.base_delay_ms == 0 {
            return Err(invalid("manager.base_delay_ms must be positive"));
        }
        if self.manager.health_check_interval_secs == 0 {
            return Err(invalid("manager.health_check_interval_secs must be positive"));
        }

        Ok(())
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DATASTORE_URL).filter(|v| !v.is_empty()) {
            self.datastore.url = Some(url);
        }
        if let Some(key) = lookup(ENV_DATASTORE_KEY).filter(|v| !v.is_empty()) {
            self.datastore.api_key = Some(key);
        }
    }

    /// Whether any registered entry uses the given transport
    pub fn uses(&self, transport: TransportKind) -> bool {
        self.connections.iter().any(|e| e.transport == transport)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Invalid {
        message: message.into(),
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_or_create_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from `path`; a missing file yields defaults
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let value = std::fs::read_to_string(path)?;
    if value.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let config: AppConfig = toml::from_str(&value)?;
    config.validate()?;
    Ok(config)
}

/// Write configuration to `path`
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
