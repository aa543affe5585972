use super::CacheEntry;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local cache tier.
#[derive(Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, entry: CacheEntry) {
        self.entries.write().unwrap().insert(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn retain_fresh(&self, now_ms: i64) -> usize {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now_ms));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
