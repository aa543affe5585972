use super::catalog::CatalogSnapshot;
use super::criteria::{Criteria, FilterError};
use crate::models::{Song, UserMusicData};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Max edit distance per word when correcting a free-text query.
const QUERY_CORRECTION_DISTANCE: usize = 2;

/// Filters over the current catalog snapshot.
///
/// Readers clone the snapshot `Arc` and work on it without holding the
/// lock, so [`FilterEngine::replace_catalog`] never waits on a running
/// filter and a filter never observes a half-built index.
pub struct FilterEngine {
    catalog: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::from_snapshot(CatalogSnapshot::default())
    }
}

impl FilterEngine {
    pub fn new(data: &UserMusicData) -> Self {
        Self::from_snapshot(CatalogSnapshot::build(data))
    }

    pub fn from_songs(songs: Vec<Song>) -> Self {
        Self::from_snapshot(CatalogSnapshot::from_songs(songs))
    }

    fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog.read().unwrap().clone()
    }

    /// Rebuild the indexes for `data` and swap them in.
    pub fn replace_catalog(&self, data: &UserMusicData) {
        let snapshot = Arc::new(CatalogSnapshot::build(data));
        info!(
            "Catalog replaced: {} songs, {} genres",
            snapshot.len(),
            snapshot.genre_count()
        );
        *self.catalog.write().unwrap() = snapshot;
    }

    pub fn filter(&self, criteria: &Criteria) -> Vec<Song> {
        let songs = self.snapshot().filter(criteria);
        debug!("Filter matched {} songs", songs.len());
        songs
    }

    pub fn filter_json(&self, criteria: &Value) -> Result<Vec<Song>, FilterError> {
        Ok(self.filter(&Criteria::from_json(criteria)?))
    }

    /// Single-key filter, e.g. `filter_by("genre", json!("rock"))`.
    pub fn filter_by(&self, key: &str, value: Value) -> Vec<Song> {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        self.filter(&Criteria::from_map(&map))
    }

    pub fn songs_by_genre(&self, genre: &str) -> Vec<Song> {
        self.snapshot().songs_by_genre(genre)
    }

    pub fn songs_by_artist(&self, artist: &str) -> Vec<Song> {
        self.snapshot().songs_by_artist(artist)
    }

    pub fn fuzzy_filter(&self, text: &str) -> Vec<Song> {
        self.snapshot().fuzzy_filter(text)
    }

    pub fn top_songs(&self, n: usize) -> Vec<Song> {
        self.snapshot().top_songs(n)
    }

    /// Replace misspelled words with the closest catalog word.
    pub fn correct_query(&self, query: &str) -> String {
        self.snapshot()
            .vocabulary()
            .correct_query(query, QUERY_CORRECTION_DISTANCE)
    }

    /// Fuzzy search that retries with a corrected query when the raw one
    /// finds nothing.
    pub fn search(&self, text: &str) -> Vec<Song> {
        let snapshot = self.snapshot();
        let hits = snapshot.fuzzy_filter(text);
        if !hits.is_empty() {
            return hits;
        }
        let corrected = snapshot
            .vocabulary()
            .correct_query(text, QUERY_CORRECTION_DISTANCE);
        if corrected.eq_ignore_ascii_case(text.trim()) {
            return hits;
        }
        debug!("No match for '{}', retrying as '{}'", text, corrected);
        snapshot.fuzzy_filter(&corrected)
    }
}
