//! Keyed string store with per-entry expiry.
//!
//! The engine and the control plane only ever see [`KvStore`]; the in-memory
//! implementation here backs tests and single-process deployments, and a
//! networked store can be dropped in behind the same trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::WorkflowResult;

/// Expiry behaviour for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire this long after the write.
    After(Duration),
    /// Keep whatever expiry the existing entry has (none if the key is new).
    Keep,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> WorkflowResult<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Ttl) -> WorkflowResult<()>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> WorkflowResult<bool>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store. Expired entries are dropped lazily on read and by
/// [`MemoryKvStore::spawn_sweeper`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically evict expired entries until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let evicted = store.sweep();
                if evicted > 0 {
                    debug!(evicted, "Swept expired registry entries");
                }
            }
        })
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> WorkflowResult<Option<String>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Ttl) -> WorkflowResult<()> {
        let now = Instant::now();
        match ttl {
            Ttl::After(duration) => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at: Some(now + duration),
                    },
                );
            }
            Ttl::Keep => {
                self.entries
                    .entry(key.to_string())
                    .and_modify(|entry| {
                        if entry.is_expired(now) {
                            entry.expires_at = None;
                        }
                        entry.value = value.clone();
                    })
                    .or_insert_with(|| Entry {
                        value: value.clone(),
                        expires_at: None,
                    });
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> WorkflowResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }
}
