//! # Per-Key Write Serialization
//!
//! SQLite serializes writers globally, but a read-check-write sequence
//! (sum the guest's ledger, compare, append) spans several statements.
//! Two such sequences for the same guest must not interleave, while
//! sequences for different guests should not wait on each other.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KeyedLocks                                        │
//! │                                                                         │
//! │   "guest-1" ──► Arc<Mutex<()>> ◄── task A (holding)                    │
//! │                                ◄── task B (waiting)                    │
//! │   "guest-2" ──► Arc<Mutex<()>> ◄── task C (holding, independent)       │
//! │                                                                         │
//! │   Entries nobody holds or waits on are dropped on the next lock call.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are process-local: one coordinator process owns the database.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// A set of async mutexes keyed by string.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held lock for one key; released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        KeyedLocks::default()
    }

    /// Waits until `key` is free and returns a guard holding it.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut entries = self.entries.lock().await;
            if entries.len() > PRUNE_THRESHOLD {
                entries.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        KeyGuard {
            key: key.to_string(),
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of keys currently tracked (held, waited on, or not yet pruned).
    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("guest-1").await;
        assert_eq!(guard.key(), "guest-1");

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("guest-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("guest-1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("guest-2")).await;
        assert!(b.is_ok());
        assert_eq!(locks.tracked().await, 2);
    }
}
