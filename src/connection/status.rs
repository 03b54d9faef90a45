//! Connection Status
//!
//! Status values published per entry, plus a read-only snapshot of an
//! entry's runtime state.

use super::{ConnectionEntry, FallbackStrategy, TransportKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single connection entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not connected, no probe running
    #[default]
    Disconnected,
    /// Probe in flight
    Connecting,
    /// Last probe succeeded
    Connected,
    /// Last probe failed, retry scheduled
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub id: String,
    pub display_name: String,
    pub transport: TransportKind,
    pub fallback: FallbackStrategy,
    pub status: ConnectionStatus,
    /// Message of the latest failed probe, cleared on success
    pub last_error: Option<String>,
    /// When the latest probe completed
    pub last_checked: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl ConnectionSnapshot {
    pub(crate) fn new(entry: &ConnectionEntry) -> Self {
        Self {
            id: entry.id.clone(),
            display_name: entry.display_name.clone(),
            transport: entry.transport,
            fallback: entry.fallback,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            last_checked: None,
            consecutive_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ConnectionStatus::Connected).expect("serialize");
        assert_eq!(json, "\"connected\"");

        let status: ConnectionStatus = serde_json::from_str("\"error\"").expect("deserialize");
        assert_eq!(status, ConnectionStatus::Error);
    }

    #[test]
    fn test_fresh_snapshot_is_disconnected() {
        let entry = ConnectionEntry::new("local", "Local", TransportKind::LocalStorage);
        let snapshot = ConnectionSnapshot::new(&entry);
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_error.is_none());
    }
}
