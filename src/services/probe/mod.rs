//! Liveness Probes
//!
//! One [`Prober`] per transport kind, looked up through a [`ProberRegistry`].
//! Probes report success or a [`ProbeError`]; the manager applies the
//! timeout and turns failures into status changes.
//!
//! ```text
//! ConnectionManager ──► ProberRegistry[TransportKind] ──► Prober::probe(entry)
//!                                                          │
//!          hosted-datastore ─ DatastoreProber  (REST query)│
//!          http-api         ─ HttpApiProber    (GET /health, fallback)
//!          websocket        ─ WebSocketProber  (handshake)
//!          local-storage    ─ StorageProber    (write + delete)
//! ```

mod datastore;
mod http;
mod storage;
mod websocket;

pub use datastore::*;
pub use http::*;
pub use storage::*;
pub use websocket::*;

use crate::connection::{ConnectionEntry, TransportKind};
use async_trait::async_trait;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Why a probe did not confirm liveness
#[derive(Debug, Snafu)]
pub enum ProbeError {
    #[snafu(display("No endpoint configured for '{id}'"))]
    MissingEndpoint { id: String },

    #[snafu(display("No prober registered for {transport}"))]
    MissingProber { transport: TransportKind },

    #[snafu(display("Timed out after {}ms", after.as_millis()))]
    Timeout { after: Duration },

    #[snafu(display("{url} returned HTTP {status}"))]
    HttpStatus { url: String, status: u16 },

    #[snafu(display("Request to {url} failed: {source}"))]
    Request { url: String, source: reqwest::Error },

    #[snafu(display("Datastore query failed with HTTP {status}: {message}"))]
    Datastore { status: u16, message: String },

    #[snafu(display("WebSocket handshake with {url} failed: {source}"))]
    WebSocket {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[snafu(display("Storage access failed: {source}"))]
    Storage { source: crate::error::Error },

    #[snafu(display("Probe task failed: {source}"))]
    Task { source: tokio::task::JoinError },
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}

/// Liveness check for one transport kind
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    /// Check whether the transport behind `entry` is alive
    async fn probe(&self, entry: &ConnectionEntry) -> Result<(), ProbeError>;
}

#[async_trait]
impl<T: Prober> Prober for Arc<T> {
    async fn probe(&self, entry: &ConnectionEntry) -> Result<(), ProbeError> {
        (**self).probe(entry).await
    }
}

/// Probers keyed by the transport kind they handle
#[derive(Clone, Default)]
pub struct ProberRegistry {
    probers: HashMap<TransportKind, Arc<dyn Prober>>,
}

impl ProberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the prober for a transport kind
    pub fn register(&mut self, transport: TransportKind, prober: impl Prober) {
        self.probers.insert(transport, Arc::new(prober));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, transport: TransportKind, prober: impl Prober) -> Self {
        self.register(transport, prober);
        self
    }

    pub fn get(&self, transport: TransportKind) -> Option<Arc<dyn Prober>> {
        self.probers.get(&transport).cloned()
    }

    pub fn contains(&self, transport: TransportKind) -> bool {
        self.probers.contains_key(&transport)
    }
}

impl std::fmt::Debug for ProberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProberRegistry")
            .field("transports", &self.probers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Join a base address and a relative path with exactly one slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUp;

    #[async_trait]
    impl Prober for AlwaysUp {
        async fn probe(&self, _entry: &ConnectionEntry) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1", "health"), "http://h:1/health");
        assert_eq!(join_url("http://h:1/", "/health"), "http://h:1/health");
        assert_eq!(join_url("http://h:1/v1//", "api/x"), "http://h:1/v1/api/x");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProberRegistry::new().with(TransportKind::HttpApi, AlwaysUp);
        assert!(registry.contains(TransportKind::HttpApi));
        assert!(registry.get(TransportKind::Websocket).is_none());
    }

    #[test]
    fn test_probe_error_display() {
        let err = ProbeError::Timeout {
            after: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "Timed out after 50ms");
        assert!(err.is_timeout());

        let err = ProbeError::HttpStatus {
            url: "http://h/api/adapters".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "http://h/api/adapters returned HTTP 503");
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_registered_prober_runs() {
        let registry = ProberRegistry::new().with(TransportKind::LocalStorage, AlwaysUp);
        let entry = ConnectionEntry::new("local", "Local", TransportKind::LocalStorage);
        let prober = registry
            .get(TransportKind::LocalStorage)
            .expect("prober registered");
        assert!(prober.probe(&entry).await.is_ok());
    }
}
