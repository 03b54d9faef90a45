//! Monitor Constants
//!
//! Centralized defaults for scheduling, backoff, and probing.

/// Backoff base delay
pub const RETRY_BASE_DELAY_MS: u64 = 2000;
/// Backoff ceiling
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Interval between health-check sweeps
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Delay between first attempts of consecutive entries at startup
pub const STARTUP_STAGGER_MS: u64 = 100;

/// Default probe timeouts per transport kind
pub const DATASTORE_TIMEOUT_MS: u64 = 10_000;
pub const HTTP_API_TIMEOUT_MS: u64 = 5000;
pub const WEBSOCKET_TIMEOUT_MS: u64 = 5000;
pub const LOCAL_STORAGE_TIMEOUT_MS: u64 = 1000;

/// Default retry ceilings (used as backoff exponent)
pub const DATASTORE_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const HTTP_API_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const WEBSOCKET_MAX_RETRY_ATTEMPTS: u32 = 5;
pub const LOCAL_STORAGE_MAX_RETRY_ATTEMPTS: u32 = 1;

/// Path appended to the API base for the primary health check
pub const HEALTH_PATH: &str = "health";
/// Path probed when the health endpoint is unreachable
pub const API_FALLBACK_PATH: &str = "api/adapters";

/// Collection queried by the datastore probe
pub const DATASTORE_COLLECTION: &str = "adapters";

/// Key written and removed by the storage probe
pub const STORAGE_SENTINEL_KEY: &str = "__connection_test__";

/// Capacity of the multiplexed status event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Network reachability monitor defaults
pub const NETWORK_CHECK_TARGET: &str = "1.1.1.1:53";
pub const NETWORK_CHECK_INTERVAL_SECS: u64 = 5;
pub const NETWORK_CHECK_TIMEOUT_MS: u64 = 2000;

/// Application identity for platform directories
pub const APP_QUALIFIER: &str = "dev";
pub const APP_ORGANIZATION: &str = "apex";
pub const APP_NAME: &str = "apex-genesis";

/// Configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";
