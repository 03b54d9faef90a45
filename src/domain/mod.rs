//! Domain - Configuration Types
//!
//! Plain data loaded from disk; no runtime dependencies.

pub mod config;

pub use config::{
    ApiSettings, AppConfig, DatastoreConfig, ManagerSettings, NetworkSettings, StorageSettings,
    default_config_path, load_config, save_config,
};
