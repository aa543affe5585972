//! Library fixtures and coordinator wiring for tests.

use catalog_enricher::config::{EnrichmentSettings, RetrySettings};
use catalog_enricher::sources::{ArtistInfo, MetadataSource, RetryPolicy, SongInfo};
use catalog_enricher::{Artist, EnrichmentCoordinator, MetadataStore, Song};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

/// Retry quickly so failure paths do not slow the suite down.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(&RetrySettings {
        max_attempts: 3,
        base_delay_ms: 10,
    })
}

pub fn settings(workers: usize, task_timeout: Duration) -> EnrichmentSettings {
    EnrichmentSettings {
        workers,
        task_timeout,
        ..Default::default()
    }
}

pub fn coordinator(
    primary: Arc<dyn MetadataSource>,
    fallbacks: Vec<Arc<dyn MetadataSource>>,
    store: Arc<dyn MetadataStore>,
    settings: EnrichmentSettings,
) -> EnrichmentCoordinator {
    EnrichmentCoordinator::new(primary, fallbacks, store, settings)
}

/// A complete answer for an artist.
pub fn full_artist_info(genre: &str) -> ArtistInfo {
    ArtistInfo {
        genres: vec![genre.to_string()],
        popularity: Some(50),
        image_url: Some("https://img.example/artist.jpg".to_string()),
        ..Default::default()
    }
}

/// A complete answer for a song.
pub fn full_song_info(album: &str) -> SongInfo {
    SongInfo {
        album: Some(album.to_string()),
        duration_ms: Some(200_000),
        release_date: NaiveDate::from_ymd_opt(2001, 5, 21),
        popularity: Some(60),
        image_url: Some("https://img.example/cover.jpg".to_string()),
        link: Some("https://open.example/track".to_string()),
        ..Default::default()
    }
}

pub fn complete_artist(name: &str) -> Artist {
    let mut artist = Artist::new(name);
    artist.genres = vec!["rock".to_string()];
    artist.image_url = Some("https://img.example/known.jpg".to_string());
    artist
}

pub fn complete_song(title: &str, artist: &str) -> Song {
    let mut song = Song::new(title, artist);
    song.album = Some("Known".to_string());
    song.release_date = NaiveDate::from_ymd_opt(1999, 1, 1);
    song.popularity = 40;
    song.image_url = Some("https://img.example/known-cover.jpg".to_string());
    song.link = Some("https://open.example/known".to_string());
    song
}
