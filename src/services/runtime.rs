//! Tokio Runtime Bridge
//!
//! The manager spawns retry timers, the sweep loop, and probe tasks. Inside
//! an async context those go to the ambient runtime; a manager built from
//! plain synchronous code falls back to a process-wide runtime.
//!
//! ```text
//! ConnectionManager::new()
//!       │
//!       ▼
//! runtime_handle() ── inside tokio? ──► Handle::current()
//!       │ no
//!       ▼
//! global multi-thread Runtime (lazily built)
//! ```

use std::sync::OnceLock;
use tokio::runtime::{Handle, Runtime};

/// Fallback runtime instance
static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or initialize the fallback runtime
fn get_runtime() -> &'static Runtime {
    TOKIO_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .thread_name("apex-genesis")
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime")
    })
}

/// Handle of the ambient runtime, or of the fallback runtime
pub fn runtime_handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| {
        tracing::debug!("No ambient tokio runtime, using fallback runtime");
        get_runtime().handle().clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_runtime_outside_tokio() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();

        runtime_handle().spawn(async move {
            flag_clone.store(true, Ordering::SeqCst);
        });

        // Give the task time to complete
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_ambient_runtime_preferred() {
        // #[tokio::test] runs current-thread; the fallback is multi-thread
        let handle = runtime_handle();
        assert_eq!(
            handle.runtime_flavor(),
            tokio::runtime::RuntimeFlavor::CurrentThread
        );
    }
}
