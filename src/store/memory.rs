use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::store::{KeyValueStore, StoreError, StoreResult};

/// Every this many key-creating writes, expired entries are swept out.
const SWEEP_EVERY: u64 = 256;

/// In-process store with Redis-like string semantics. Increments hold the
/// shard lock of their key, which gives the same atomicity `INCR` does.
///
/// Expired keys are dropped lazily on access and by a periodic sweep, so keys
/// that are never touched again do not accumulate.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Must not be called while holding a reference into `entries`.
    fn record_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let now = Instant::now();
            let before = self.entries.len();
            self.entries.retain(|_, entry| entry.is_live(now));
            tracing::debug!(
                removed = before.saturating_sub(self.entries.len()),
                "swept expired entries from memory store"
            );
        }
    }

    fn live_entry<R>(&self, key: &str, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(key)?;
        if entry.is_live(now) {
            Some(f(&mut entry))
        } else {
            drop(entry);
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let next = {
            let now = Instant::now();
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Bytes::from_static(b"0"),
                expires_at: None,
            });

            if !entry.is_live(now) {
                entry.value = Bytes::from_static(b"0");
                entry.expires_at = None;
            }

            let current = std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| StoreError::InvalidValue(format!("{key} is not an integer")))?;
            let next = current + 1;
            entry.value = Bytes::from(next.to_string());
            next
        };

        self.record_write();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let deadline = Instant::now() + ttl;
        self.live_entry(key, |entry| entry.expires_at = Some(deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.live_entry(key, |entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        self.record_write();
        Ok(())
    }

    async fn ping(&self) -> StoreResult<Duration> {
        Ok(Duration::ZERO)
    }
}
