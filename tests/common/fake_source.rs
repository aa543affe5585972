//! Scripted in-process metadata source with call instrumentation.

use async_trait::async_trait;
use catalog_enricher::normalize_key;
use catalog_enricher::sources::{ArtistInfo, MetadataSource, SongInfo};
use catalog_enricher::{SourceError, SourceKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Decrements the in-flight gauge even when the call is dropped mid-way,
/// as happens on timeouts.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Answers lookups from fixed tables.
///
/// Artists are matched on normalized name or on `id:<id>`, songs on
/// normalized `title|artist` or on `id:<id>`. Anything else is "not found".
pub struct FakeSource {
    kind: SourceKind,
    artists: HashMap<String, ArtistInfo>,
    songs: HashMap<String, SongInfo>,
    default_artist: Option<ArtistInfo>,
    error: Option<SourceError>,
    latency: Duration,
    calls: AtomicUsize,
    by_id_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            artists: HashMap::new(),
            songs: HashMap::new(),
            default_artist: None,
            error: None,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            by_id_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_artist(mut self, name: &str, info: ArtistInfo) -> Self {
        self.artists.insert(normalize_key(name), info);
        self
    }

    pub fn with_artist_id(mut self, id: &str, info: ArtistInfo) -> Self {
        self.artists.insert(format!("id:{}", id), info);
        self
    }

    /// Answer every artist lookup that has no specific entry.
    pub fn with_any_artist(mut self, info: ArtistInfo) -> Self {
        self.default_artist = Some(info);
        self
    }

    pub fn with_song(mut self, title: &str, artist: &str, info: SongInfo) -> Self {
        self.songs.insert(song_key(title, artist), info);
        self
    }

    pub fn failing_with(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn by_id_calls(&self) -> usize {
        self.by_id_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn artist(&self, key: &str) -> Option<ArtistInfo> {
        self.artists
            .get(key)
            .or(self.default_artist.as_ref())
            .cloned()
    }
}

fn song_key(title: &str, artist: &str) -> String {
    format!("{}|{}", normalize_key(title), normalize_key(artist))
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.artist(&format!("id:{}", id)))
    }

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError> {
        self.enter().await?;
        Ok(self.artist(&normalize_key(name)))
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.songs.get(&format!("id:{}", id)).cloned())
    }

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError> {
        self.enter().await?;
        Ok(self.songs.get(&song_key(title, artist)).cloned())
    }
}
