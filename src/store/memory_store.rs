//! In-memory metadata store, for dry runs and tests.

use super::trait_def::MetadataStore;
use crate::enrichment::merge::{fill_artist_from, fill_song_from};
use crate::models::{Artist, Song, UserMusicData};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct InMemoryMetadataStore {
    artists: Mutex<HashMap<String, Artist>>,
    songs: Mutex<HashMap<String, Song>>,
    reachable: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            artists: Mutex::new(HashMap::new()),
            songs: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Make every call fail, as if the backing database went away.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn artist(&self, name: &str) -> Option<Artist> {
        self.artists
            .lock()
            .unwrap()
            .get(&crate::cache::normalize_key(name))
            .cloned()
    }

    pub fn song(&self, title: &str, artist: &str) -> Option<Song> {
        self.songs
            .lock()
            .unwrap()
            .get(&Song::new(title, artist).name_key())
            .cloned()
    }

    pub fn artist_count(&self) -> usize {
        self.artists.lock().unwrap().len()
    }

    pub fn song_count(&self) -> usize {
        self.songs.lock().unwrap().len()
    }

    fn check_reachable(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            bail!("metadata store is unreachable");
        }
        Ok(())
    }
}

fn merge_stored_artist(stored: &Artist, incoming: &Artist) -> Artist {
    let mut merged = incoming.clone();
    merged.ids = stored.ids.clone();
    merged.ids.fill_from(&incoming.ids);
    if !stored.genres.is_empty() {
        merged.genres = stored.genres.clone();
    }
    fill_artist_from(&mut merged, stored);
    merged
}

fn merge_stored_song(stored: &Song, incoming: &Song) -> Song {
    let mut merged = incoming.clone();
    merged.ids = stored.ids.clone();
    merged.ids.fill_from(&incoming.ids);
    if !stored.genres.is_empty() {
        merged.genres = stored.genres.clone();
    }
    fill_song_from(&mut merged, stored);
    merged
}

impl MetadataStore for InMemoryMetadataStore {
    fn fetch_complete(&self, data: &mut UserMusicData) -> Result<()> {
        self.check_reachable()?;

        let artists = self.artists.lock().unwrap();
        for artist in &mut data.artists {
            if let Some(stored) = artists.get(&artist.key()) {
                fill_artist_from(artist, stored);
            }
        }

        let songs = self.songs.lock().unwrap();
        for song in &mut data.songs {
            if let Some(stored) = songs.get(&song.name_key()) {
                fill_song_from(song, stored);
            }
        }
        Ok(())
    }

    fn upsert_enriched(&self, artists: &[Artist], songs: &[Song]) -> Result<()> {
        self.check_reachable()?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut stored_artists = self.artists.lock().unwrap();
        for artist in artists {
            let merged = match stored_artists.get(&artist.key()) {
                Some(stored) => merge_stored_artist(stored, artist),
                None => artist.clone(),
            };
            stored_artists.insert(artist.key(), merged);
        }

        let mut stored_songs = self.songs.lock().unwrap();
        for song in songs {
            let merged = match stored_songs.get(&song.name_key()) {
                Some(stored) => merge_stored_song(stored, song),
                None => song.clone(),
            };
            stored_songs.insert(song.name_key(), merged);
        }
        Ok(())
    }
}
