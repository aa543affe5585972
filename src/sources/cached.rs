use super::{ArtistInfo, MetadataSource, SongInfo, SourceError};
use crate::cache::{normalize_key, TieredCache};
use crate::models::SourceKind;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Serves repeated lookups from the tiered cache.
///
/// Only non-empty answers are stored, so a "not found" or a failure is asked
/// again on the next lookup.
pub struct CachedSource {
    inner: Arc<dyn MetadataSource>,
    cache: Arc<TieredCache>,
    ttl: Duration,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn MetadataSource>, cache: Arc<TieredCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// Each query part is normalized on its own, so part boundaries survive.
    fn key(&self, operation: &str, parts: &[&str]) -> String {
        let query: Vec<String> = parts.iter().map(|part| normalize_key(part)).collect();
        format!("{}:{}:{}", self.inner.name(), operation, query.join("|"))
    }

    async fn cached<T, F, Fut>(
        &self,
        key: String,
        is_empty: fn(&T) -> bool,
        fetch: F,
    ) -> Result<Option<T>, SourceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, SourceError>>,
    {
        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<T>(value) {
                Ok(hit) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Some(hit));
                }
                Err(e) => {
                    warn!(key = %key, "Dropping unreadable cache entry: {}", e);
                    self.cache.invalidate(&key);
                }
            }
        }

        let fetched = fetch().await?;
        if let Some(found) = fetched.as_ref().filter(|found| !is_empty(found)) {
            match serde_json::to_value(found) {
                Ok(value) => self.cache.put(&key, value, self.ttl),
                Err(e) => warn!(key = %key, "Failed to serialize lookup for caching: {}", e),
            }
        }
        Ok(fetched)
    }
}

#[async_trait]
impl MetadataSource for CachedSource {
    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let key = self.key("artist-id", &[id]);
        self.cached(key, ArtistInfo::is_empty, || self.inner.artist_by_id(id))
            .await
    }

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let key = self.key("artist-name", &[name]);
        self.cached(key, ArtistInfo::is_empty, || self.inner.artist_by_name(name))
            .await
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError> {
        let key = self.key("song-id", &[id]);
        self.cached(key, SongInfo::is_empty, || self.inner.song_by_id(id))
            .await
    }

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError> {
        let key = self.key("song-name", &[title, artist]);
        self.cached(key, SongInfo::is_empty, || {
            self.inner.song_by_name(title, artist)
        })
        .await
    }
}
