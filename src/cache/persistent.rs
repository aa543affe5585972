//! Durable cache tiers.

use super::{CacheEntry, CacheError};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// A cache tier that outlives the process.
pub trait PersistentTier: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn insert(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
    /// Drop entries expired at `now_ms`, returning how many were removed.
    fn retain_fresh(&self, now_ms: i64) -> Result<usize, CacheError>;
    fn len(&self) -> usize;
}

/// Used when persistence is disabled.
pub struct NoPersistence;

impl PersistentTier for NoPersistence {
    fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    fn insert(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn retain_fresh(&self, _now_ms: i64) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn len(&self) -> usize {
        0
    }
}

/// All entries kept in one JSON document, rewritten on every change.
///
/// Writes go to a temp file in the same directory which then replaces the
/// document, so a crash never leaves a half-written cache behind.
pub struct JsonFileTier {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl JsonFileTier {
    pub const FILE_NAME: &'static str = "metadata_cache.json";

    /// Open the cache document in `dir`, creating the directory if needed.
    ///
    /// A missing document starts an empty cache. A corrupt one is logged and
    /// discarded.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&content) {
                Ok(entries) => {
                    info!("Loaded {} cache entries from {:?}", entries.len(), path);
                    entries
                }
                Err(e) => {
                    warn!("Discarding unreadable cache file {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let content = serde_json::to_vec(entries)?;
        tmp.write_all(&content)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::Persist(e.to_string()))?;
        Ok(())
    }
}

impl PersistentTier for JsonFileTier {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn insert(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), entry);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        self.flush(&entries)
    }

    fn retain_fresh(&self, now_ms: i64) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now_ms));
        let removed = before - entries.len();
        if removed > 0 {
            self.flush(&entries)?;
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TieredCache;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = TieredCache::new(Box::new(JsonFileTier::open(dir.path()).unwrap()));
            cache.put("spotify:artist:adele", json!({"name": "Adele"}), Duration::from_secs(60));
        }

        let cache = TieredCache::new(Box::new(JsonFileTier::open(dir.path()).unwrap()));
        assert_eq!(
            cache.get("spotify:artist:adele"),
            Some(json!({"name": "Adele"}))
        );
        assert_eq!(cache.stats().persistent_hits, 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(JsonFileTier::FILE_NAME), "{not json").unwrap();

        let tier = JsonFileTier::open(dir.path()).unwrap();
        assert_eq!(tier.len(), 0);

        tier.insert("k", CacheEntry::new(json!(1), Duration::from_secs(5)))
            .unwrap();
        let reopened = JsonFileTier::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_remove_and_clear_are_persisted() {
        let dir = TempDir::new().unwrap();
        let tier = JsonFileTier::open(dir.path()).unwrap();
        tier.insert("a", CacheEntry::new(json!(1), Duration::from_secs(5)))
            .unwrap();
        tier.insert("b", CacheEntry::new(json!(2), Duration::from_secs(5)))
            .unwrap();
        tier.remove("a").unwrap();
        assert_eq!(JsonFileTier::open(dir.path()).unwrap().len(), 1);

        tier.clear().unwrap();
        assert_eq!(JsonFileTier::open(dir.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_no_persistence_never_stores() {
        let tier = NoPersistence;
        tier.insert("k", CacheEntry::new(json!(1), Duration::from_secs(5)))
            .unwrap();
        assert_eq!(tier.get("k").unwrap(), None);
        assert_eq!(tier.len(), 0);
    }
}
