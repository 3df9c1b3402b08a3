//! In-process write serialization per remote path.
//!
//! Read-modify-write cycles against the same object run one at a time within
//! a process. Across processes the store relies on conditional writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held for the duration of one read-modify-write cycle.
pub type PathGuard = OwnedMutexGuard<()>;

/// One async mutex per remote path.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `path`.
    pub async fn lock(&self, path: &str) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.lock("profiles/a.parquet").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("profiles/a.parquet").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.expect("contender acquires after release");
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock("profiles/a.parquet").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock("profiles/b.parquet"))
            .await
            .expect("independent path");
    }
}
