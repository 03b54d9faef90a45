//! Service Events
//!
//! Events flowing out of the connection manager to observers, and the
//! environment signals flowing into it.

use crate::connection::ConnectionStatus;
use std::sync::Arc;

/// Status change published for an entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Entry id
    pub id: Arc<str>,
    /// New status
    pub status: ConnectionStatus,
    /// Additional detail (e.g., "Retrying in 16s")
    pub detail: Arc<str>,
}

/// Environment signals delivered to [`crate::services::ConnectionManager::handle`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Network became reachable again
    Online,
    /// Network went away
    Offline,
    /// The host surface became visible; timers may have been throttled
    Visible,
    /// The process is shutting down
    Teardown,
}
