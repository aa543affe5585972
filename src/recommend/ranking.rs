//! Pure ranking helpers over a catalog snapshot.

use crate::cache::normalize_key;
use crate::filter::genres::genre_key;
use crate::filter::{CatalogSnapshot, Criteria};
use crate::models::Song;
use std::collections::{HashMap, HashSet};

/// Values ordered by descending count, ties by first appearance.
pub fn by_frequency<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(value, (count, first))| (value, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().map(|(value, _, _)| value).collect()
}

/// Genre and artist preferences derived from a listening history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub genres: Vec<String>,
    pub artists: Vec<String>,
}

impl Preferences {
    /// Rank the genres and artists of `history`. History songs without tags
    /// use the genres the catalog indexed them under.
    pub fn from_history(history: &[Song], catalog: &CatalogSnapshot) -> Self {
        let catalog_genres: HashMap<String, &[String]> = catalog
            .songs()
            .iter()
            .enumerate()
            .map(|(i, song)| (song.name_key(), catalog.genres_of(i)))
            .collect();

        let mut genres = Vec::new();
        for song in history {
            if song.genres.is_empty() {
                if let Some(tags) = catalog_genres.get(&song.name_key()) {
                    genres.extend(tags.iter().cloned());
                }
            } else {
                genres.extend(song.genres.iter().map(|g| genre_key(g)));
            }
        }

        Self {
            genres: by_frequency(genres),
            artists: by_frequency(history.iter().map(|s| normalize_key(&s.artist_name))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty() && self.artists.is_empty()
    }
}

/// Keeps the first song per identity, up to a cap.
pub struct Selection {
    songs: Vec<Song>,
    seen: HashSet<String>,
    cap: usize,
}

impl Selection {
    pub fn new(cap: usize) -> Self {
        Self {
            songs: Vec::new(),
            seen: HashSet::new(),
            cap,
        }
    }

    pub fn is_full(&self) -> bool {
        self.songs.len() >= self.cap
    }

    pub fn contains(&self, song: &Song) -> bool {
        self.seen.contains(&song.identity())
    }

    /// Add songs in order until full. Returns how many were taken.
    pub fn extend<I: IntoIterator<Item = Song>>(&mut self, songs: I) -> usize {
        let mut taken = 0;
        for song in songs {
            if self.is_full() {
                break;
            }
            if self.seen.insert(song.identity()) {
                self.songs.push(song);
                taken += 1;
            }
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn into_songs(self) -> Vec<Song> {
        self.songs
    }
}

/// Songs for each preferred genre, then each preferred artist, most
/// frequent first.
pub fn personalized(catalog: &CatalogSnapshot, preferences: &Preferences, max: usize) -> Vec<Song> {
    let mut selection = Selection::new(max);
    for genre in &preferences.genres {
        if selection.is_full() {
            break;
        }
        selection.extend(catalog.filter(&Criteria::default().with_genres([genre])));
    }
    for artist in &preferences.artists {
        if selection.is_full() {
            break;
        }
        selection.extend(catalog.songs_by_artist(artist));
    }
    selection.into_songs()
}

/// Personalized songs for half the list, rounded up, then trending songs.
pub fn hybrid(catalog: &CatalogSnapshot, preferences: &Preferences, max: usize) -> Vec<Song> {
    let mut selection = Selection::new(max);
    selection.extend(personalized(catalog, preferences, max.div_ceil(2)));
    selection.extend(catalog.top_songs(catalog.len()));
    selection.into_songs()
}
