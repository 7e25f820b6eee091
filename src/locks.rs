//! Keyed async locks
//!
//! A table from resource key to mutex. Guards are owned, so they can be
//! held across await points and are released on drop along every exit path.
//! Idle entries are pruned on the next acquisition.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A held keyed lock
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Mutual exclusion per string key
#[derive(Debug, Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the table holds an idle entry
        table.retain(|k, m| k == key || Arc::strong_count(m) > 1);
        table.entry(key.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: impl Into<String>) -> KeyedGuard {
        let key = key.into();
        let mutex = self.entry(&key);
        let guard = mutex.lock_owned().await;
        log::trace!("Acquired lock {}", key);
        KeyedGuard { key, _guard: guard }
    }

    /// Lock several keys in sorted order; duplicates are taken once
    pub async fn lock_many<I, K>(&self, keys: I) -> Vec<KeyedGuard>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let sorted: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently tracked
    pub fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (locks, inside, max_seen) = (locks.clone(), inside.clone(), max_seen.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("wallet").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_lock_many_dedups_and_sorts() {
        let locks = KeyedLocks::new();
        let guards = locks.lock_many(["c", "a", "c", "b"]).await;
        let keys: Vec<&str> = guards.iter().map(|g| g.key()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = KeyedLocks::new();
        for i in 0..10 {
            let _guard = locks.lock(format!("k{}", i)).await;
        }
        let _last = locks.lock("final").await;
        assert_eq!(locks.tracked(), 1);
    }
}
