//! Local storage probe
//!
//! Writes then deletes a sentinel key. Store I/O runs on the blocking pool.

use super::{ProbeError, Prober, StorageSnafu, TaskSnafu};
use crate::connection::ConnectionEntry;
use crate::constants::STORAGE_SENTINEL_KEY;
use crate::utils::KeyValueStore;
use async_trait::async_trait;
use snafu::ResultExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct StorageProber {
    store: Arc<dyn KeyValueStore>,
}

impl StorageProber {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Prober for StorageProber {
    async fn probe(&self, _entry: &ConnectionEntry) -> Result<(), ProbeError> {
        let store = self.store.clone();
        let value = chrono::Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || {
            store.set(STORAGE_SENTINEL_KEY, &value)?;
            store.remove(STORAGE_SENTINEL_KEY)
        })
        .await
        .context(TaskSnafu)?
        .context(StorageSnafu)
    }
}

impl std::fmt::Debug for StorageProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageProber").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportKind;
    use crate::error::Error;
    use crate::utils::MemoryStore;

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> crate::error::Result<()> {
            Err(Error::Invalid {
                message: "quota exceeded".to_string(),
            })
        }

        fn remove(&self, _key: &str) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn entry() -> ConnectionEntry {
        ConnectionEntry::new("local", "Local", TransportKind::LocalStorage)
    }

    #[tokio::test]
    async fn test_probe_leaves_no_sentinel() {
        let store = Arc::new(MemoryStore::new());
        let prober = StorageProber::new(store.clone());

        prober.probe(&entry()).await.expect("probe");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_probe_failure() {
        let prober = StorageProber::new(Arc::new(ReadOnlyStore));
        let err = prober.probe(&entry()).await.expect_err("probe should fail");
        assert!(matches!(err, ProbeError::Storage { .. }));
        assert_eq!(err.to_string(), "Storage access failed: Invalid: quota exceeded");
    }
}
