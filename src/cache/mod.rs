//! Two-tier response cache.
//!
//! Lookups try the in-memory tier first, then the persistent tier. A hit on
//! the persistent tier is promoted into memory with its remaining TTL. An
//! expired entry found on either tier is a miss and is dropped from both.
//!
//! Keys are opaque strings; callers normalize them with [`normalize_key`]
//! before any cache operation.

mod memory;
mod persistent;

pub use memory::MemoryTier;
pub use persistent::{JsonFileTier, NoPersistence, PersistentTier};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a persistent cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache file could not be replaced: {0}")]
    Persist(String),
}

/// Lowercase, trim, and strip everything that is not alphanumeric.
pub fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A cached value together with the wall-clock time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub inserted_at_ms: i64,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms - self.inserted_at_ms >= self.ttl_ms as i64
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Hit/miss counters, reported per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub memory_entries: usize,
    pub persistent_entries: usize,
    pub persistent_enabled: bool,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

pub struct TieredCache {
    memory: MemoryTier,
    persistent: Box<dyn PersistentTier>,
    persistent_enabled: AtomicBool,
    counters: Counters,
}

impl TieredCache {
    pub fn new(persistent: Box<dyn PersistentTier>) -> Self {
        Self {
            memory: MemoryTier::new(),
            persistent,
            persistent_enabled: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// A cache without a persistent tier.
    pub fn in_memory() -> Self {
        Self::new(Box::new(NoPersistence))
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = now_ms();

        if let Some(entry) = self.memory.get(key) {
            if entry.is_expired_at(now) {
                debug!("Cache entry expired: {}", key);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.invalidate(key);
                return None;
            }
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value);
        }

        if self.persistent_enabled() {
            match self.persistent.get(key) {
                Ok(Some(entry)) if entry.is_expired_at(now) => {
                    debug!("Persistent cache entry expired: {}", key);
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    self.invalidate(key);
                }
                Ok(Some(entry)) => {
                    self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                    // Keeps the original insertion time, so the remaining TTL carries over
                    self.memory.insert(key, entry.clone());
                    return Some(entry.value);
                }
                Ok(None) => {}
                Err(e) => warn!("Persistent cache read failed for {}: {}", key, e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        self.memory.insert(key, entry.clone());

        if self.persistent_enabled() {
            if let Err(e) = self.persistent.insert(key, entry) {
                self.disable_persistence(&e);
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.memory.remove(key);
        if self.persistent_enabled() {
            if let Err(e) = self.persistent.remove(key) {
                self.disable_persistence(&e);
            }
        }
    }

    pub fn clear(&self) {
        self.memory.clear();
        if self.persistent_enabled() {
            if let Err(e) = self.persistent.clear() {
                self.disable_persistence(&e);
            }
        }
    }

    /// Drop every expired entry from both tiers. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        let mut removed = self.memory.retain_fresh(now);
        if self.persistent_enabled() {
            match self.persistent.retain_fresh(now) {
                Ok(count) => removed += count,
                Err(e) => self.disable_persistence(&e),
            }
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            memory_entries: self.memory.len(),
            persistent_entries: self.persistent.len(),
            persistent_enabled: self.persistent_enabled(),
        }
    }

    pub fn persistent_enabled(&self) -> bool {
        self.persistent_enabled.load(Ordering::Relaxed)
    }

    fn disable_persistence(&self, error: &CacheError) {
        if self.persistent_enabled.swap(false, Ordering::Relaxed) {
            warn!(
                "Persistent cache tier failed, continuing memory-only: {}",
                error
            );
        }
    }
}
