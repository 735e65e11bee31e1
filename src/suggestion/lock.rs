use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One exclusive lock per branch name.
///
/// Holding the guard for a branch serializes every content mutation on it;
/// different branches never wait on each other.
#[derive(Debug, Default)]
pub struct BranchLocks {
    branches: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `branch`.
    pub async fn lock(&self, branch: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut branches = self.branches.lock().await;
            Arc::clone(branches.entry(branch.to_string()).or_default())
        };
        debug!(branch, "waiting for branch lock");
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_branch_is_exclusive() {
        let locks = BranchLocks::new();
        let _held = locks.lock("feature").await;
        let second = tokio::time::timeout(Duration::from_millis(20), locks.lock("feature")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_other_branches_do_not_wait() {
        let locks = BranchLocks::new();
        let _held = locks.lock("feature").await;
        let other = tokio::time::timeout(Duration::from_millis(20), locks.lock("main")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let locks = BranchLocks::new();
        drop(locks.lock("feature").await);
        let again = tokio::time::timeout(Duration::from_millis(20), locks.lock("feature")).await;
        assert!(again.is_ok());
    }
}
