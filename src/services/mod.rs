//! Service Layer
//!
//! Connection supervision: probing, retries, and status publication.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager                         │
//! │  ┌────────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │  │ EntrySupervisor│  │ProberRegistry│  │  BackoffPolicy │   │
//! │  │ (status/retry) │  │ (per kind)   │  │  (retry delay) │   │
//! │  └────────────────┘  └──────────────┘  └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲ ManagerEvent                      │ ConnectionEvent
//!        │                                   ▼ + callbacks
//! ┌──────────────┐                   ┌──────────────────────────┐
//! │NetworkMonitor│                   │       Subscribers        │
//! └──────────────┘                   └──────────────────────────┘
//! ```

mod events;
mod manager;
mod network;
pub mod probe;
mod runtime;
mod supervisor;

pub use events::*;
pub use manager::*;
pub use network::*;
pub use runtime::*;
pub use supervisor::BackoffPolicy;
