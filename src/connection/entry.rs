//! Connection Entries
//!
//! Static description of one logical connection tracked by the manager.

use crate::constants::{
    DATASTORE_MAX_RETRY_ATTEMPTS, DATASTORE_TIMEOUT_MS, HTTP_API_MAX_RETRY_ATTEMPTS,
    HTTP_API_TIMEOUT_MS, LOCAL_STORAGE_MAX_RETRY_ATTEMPTS, LOCAL_STORAGE_TIMEOUT_MS,
    WEBSOCKET_MAX_RETRY_ATTEMPTS, WEBSOCKET_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Category of backing system, selects the probe implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Hosted Postgres/REST datastore
    HostedDatastore,
    /// Backend HTTP API
    HttpApi,
    /// Real-time websocket channel
    Websocket,
    /// Local persistent key-value storage
    LocalStorage,
}

impl TransportKind {
    /// Whether probes of this kind need an `endpoint`
    pub fn requires_endpoint(&self) -> bool {
        matches!(self, TransportKind::HttpApi | TransportKind::Websocket)
    }

    /// Whether this kind depends on the network at all
    pub fn is_networked(&self) -> bool {
        !matches!(self, TransportKind::LocalStorage)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::HostedDatastore => "hosted-datastore",
            TransportKind::HttpApi => "http-api",
            TransportKind::Websocket => "websocket",
            TransportKind::LocalStorage => "local-storage",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Advisory hint for dependents when an entry is not connected.
///
/// The manager never acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    Offline,
    Mock,
    Cache,
}

/// One registered logical connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Stable key
    pub id: String,
    /// Human-readable label
    pub display_name: String,
    /// Transport kind (selects the probe)
    pub transport: TransportKind,
    /// Probe address; unused by datastore and storage entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Probe timeout in milliseconds
    pub timeout_ms: u64,
    /// Backoff exponent, not a limit on the number of retries
    pub max_retry_attempts: u32,
    /// Advisory fallback for dependents
    pub fallback: FallbackStrategy,
}

impl ConnectionEntry {
    /// Create an entry with the defaults of its transport kind
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        transport: TransportKind,
    ) -> Self {
        let (timeout_ms, max_retry_attempts, fallback) = match transport {
            TransportKind::HostedDatastore => (
                DATASTORE_TIMEOUT_MS,
                DATASTORE_MAX_RETRY_ATTEMPTS,
                FallbackStrategy::Cache,
            ),
            TransportKind::HttpApi => (
                HTTP_API_TIMEOUT_MS,
                HTTP_API_MAX_RETRY_ATTEMPTS,
                FallbackStrategy::Mock,
            ),
            TransportKind::Websocket => (
                WEBSOCKET_TIMEOUT_MS,
                WEBSOCKET_MAX_RETRY_ATTEMPTS,
                FallbackStrategy::Offline,
            ),
            TransportKind::LocalStorage => (
                LOCAL_STORAGE_TIMEOUT_MS,
                LOCAL_STORAGE_MAX_RETRY_ATTEMPTS,
                FallbackStrategy::Offline,
            ),
        };

        Self {
            id: id.into(),
            display_name: display_name.into(),
            transport,
            endpoint: None,
            timeout_ms,
            max_retry_attempts,
            fallback,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Probe timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The standard registry: hosted database, backend API, realtime channel, local storage
    pub fn defaults() -> Vec<ConnectionEntry> {
        vec![
            ConnectionEntry::new("supabase", "Supabase Database", TransportKind::HostedDatastore),
            ConnectionEntry::new("api", "Backend API", TransportKind::HttpApi)
                .with_endpoint("http://localhost:3001"),
            ConnectionEntry::new("websocket", "Realtime Channel", TransportKind::Websocket)
                .with_endpoint("ws://localhost:3001/ws"),
            ConnectionEntry::new("local", "Local Storage", TransportKind::LocalStorage),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_transport() {
        let entries = ConnectionEntry::defaults();
        let kinds: Vec<_> = entries.iter().map(|e| e.transport).collect();
        assert_eq!(
            kinds,
            vec![
                TransportKind::HostedDatastore,
                TransportKind::HttpApi,
                TransportKind::Websocket,
                TransportKind::LocalStorage,
            ]
        );

        for entry in &entries {
            assert_eq!(entry.transport.requires_endpoint(), entry.endpoint.is_some());
        }
    }

    #[test]
    fn test_entry_builder() {
        let entry = ConnectionEntry::new("api", "API", TransportKind::HttpApi)
            .with_endpoint("http://127.0.0.1:8080")
            .with_timeout(Duration::from_millis(50))
            .with_max_retry_attempts(0)
            .with_fallback(FallbackStrategy::Cache);

        assert_eq!(entry.timeout(), Duration::from_millis(50));
        assert_eq!(entry.max_retry_attempts, 0);
        assert_eq!(entry.fallback, FallbackStrategy::Cache);
        assert_eq!(entry.endpoint.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_transport_kind_toml_names() {
        let entry: ConnectionEntry = toml::from_str(
            r#"
            id = "local"
            display_name = "Local"
            transport = "local-storage"
            timeout_ms = 500
            max_retry_attempts = 2
            fallback = "offline"
            "#,
        )
        .expect("parse entry");

        assert_eq!(entry.transport, TransportKind::LocalStorage);
        assert!(entry.endpoint.is_none());
        assert!(!entry.transport.is_networked());
    }
}
