//! Immutable, indexed view of the enriched catalog.

use super::criteria::Criteria;
use super::fuzzy::{fuzzy_filter, Vocabulary};
use super::genres::genre_key;
use crate::cache::normalize_key;
use crate::models::{Song, UserMusicData};
use std::collections::{BTreeSet, HashMap};

/// Songs plus genre and artist indexes.
///
/// A snapshot is never mutated after it is built; catalog changes build a
/// new one.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    songs: Vec<Song>,
    /// Genre keys each song is filtered on, own tags or its artist's.
    genres: Vec<Vec<String>>,
    by_genre: HashMap<String, Vec<usize>>,
    by_artist: HashMap<String, Vec<usize>>,
    vocabulary: Vocabulary,
}

impl CatalogSnapshot {
    /// Index the library's songs. Songs without tags of their own are
    /// indexed under their artist's genres.
    pub fn build(data: &UserMusicData) -> Self {
        let artist_genres: HashMap<String, &[String]> = data
            .artists
            .iter()
            .map(|artist| (artist.key(), artist.genres.as_slice()))
            .collect();

        let genres: Vec<Vec<String>> = data
            .songs
            .iter()
            .map(|song| {
                let tags: &[String] = if song.genres.is_empty() {
                    artist_genres
                        .get(&normalize_key(&song.artist_name))
                        .copied()
                        .unwrap_or(&[])
                } else {
                    &song.genres
                };
                tags.iter().map(|g| genre_key(g)).collect::<Vec<_>>()
            })
            .collect();

        Self::index(data.songs.clone(), genres)
    }

    pub fn from_songs(songs: Vec<Song>) -> Self {
        let genres: Vec<Vec<String>> = songs
            .iter()
            .map(|song| song.genres.iter().map(|g| genre_key(g)).collect())
            .collect();
        Self::index(songs, genres)
    }

    fn index(songs: Vec<Song>, genres: Vec<Vec<String>>) -> Self {
        let mut by_genre: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_artist: HashMap<String, Vec<usize>> = HashMap::new();
        let mut vocabulary = Vocabulary::new();

        for (index, song) in songs.iter().enumerate() {
            let song_genres: &Vec<String> = &genres[index];
            for genre in song_genres {
                let entries = by_genre.entry(genre.clone()).or_default();
                if entries.last() != Some(&index) {
                    entries.push(index);
                }
            }
            by_artist
                .entry(normalize_key(&song.artist_name))
                .or_default()
                .push(index);
            vocabulary.add_text(&song.title);
            vocabulary.add_text(&song.artist_name);
        }

        Self {
            songs,
            genres,
            by_genre,
            by_artist,
            vocabulary,
        }
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Genre keys the song at `index` is filtered on.
    pub fn genres_of(&self, index: usize) -> &[String] {
        self.genres.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn genre_count(&self) -> usize {
        self.by_genre.len()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Catalog positions of songs tagged with any of `genre_keys`, in
    /// catalog order.
    fn indices_for_genres(&self, genre_keys: &[String]) -> BTreeSet<usize> {
        genre_keys
            .iter()
            .filter_map(|key| self.by_genre.get(key))
            .flatten()
            .copied()
            .collect()
    }

    pub fn songs_by_genre(&self, genre: &str) -> Vec<Song> {
        self.indices_for_genres(&[genre_key(genre)])
            .into_iter()
            .map(|i| self.songs[i].clone())
            .collect()
    }

    pub fn songs_by_artist(&self, artist: &str) -> Vec<Song> {
        self.by_artist
            .get(&normalize_key(artist))
            .map(|indices| indices.iter().map(|&i| self.songs[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Songs matching every predicate in `criteria`, in catalog order.
    pub fn filter(&self, criteria: &Criteria) -> Vec<Song> {
        let candidates: Vec<usize> = if !criteria.genres.is_empty() {
            self.indices_for_genres(&criteria.genre_keys())
                .into_iter()
                .collect()
        } else if let Some(artist) = &criteria.artist {
            self.by_artist.get(artist).cloned().unwrap_or_default()
        } else {
            (0..self.songs.len()).collect()
        };

        candidates
            .into_iter()
            .map(|i| &self.songs[i])
            .filter(|song| criteria.matches_scalars(song))
            .cloned()
            .collect()
    }

    pub fn fuzzy_filter(&self, text: &str) -> Vec<Song> {
        fuzzy_filter(&self.songs, text)
    }

    /// The `n` most popular songs; equal popularity keeps catalog order.
    pub fn top_songs(&self, n: usize) -> Vec<Song> {
        let mut ranked: Vec<&Song> = self.songs.iter().collect();
        ranked.sort_by(|a, b| b.popularity.cmp(&a.popularity));
        ranked.into_iter().take(n).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artist;

    fn song(title: &str, artist: &str, popularity: u8, genres: &[&str]) -> Song {
        let mut song = Song::new(title, artist);
        song.popularity = popularity;
        song.genres = genres.iter().map(|g| g.to_string()).collect();
        song
    }

    #[test]
    fn test_songs_inherit_artist_genres_in_index() {
        let mut artist = Artist::new("Bonobo");
        artist.genres = vec!["Electronic".into(), "Downtempo".into()];
        let data = UserMusicData::new(
            vec![artist],
            vec![
                song("Kerala", "bonobo", 60, &[]),
                song("Cirrus", "Bonobo", 55, &["ambient"]),
            ],
        );

        let catalog = CatalogSnapshot::build(&data);
        assert_eq!(catalog.genres_of(0), ["electronic", "downtempo"]);
        assert_eq!(catalog.genres_of(1), ["ambient"]);
        assert_eq!(catalog.songs_by_genre("electronic").len(), 1);
        assert_eq!(catalog.songs_by_artist("BONOBO").len(), 2);
        assert_eq!(catalog.genre_count(), 3);
    }

    #[test]
    fn test_duplicate_tags_index_once() {
        let catalog = CatalogSnapshot::from_songs(vec![song("Nightcall", "Kavinsky", 70, &[
            "synthwave",
            "Synthwave",
        ])]);
        assert_eq!(catalog.songs_by_genre("synthwave").len(), 1);
    }

    #[test]
    fn test_top_songs_stable_ties() {
        let catalog = CatalogSnapshot::from_songs(vec![
            song("a", "x", 10, &[]),
            song("b", "x", 90, &[]),
            song("c", "x", 50, &[]),
            song("d", "x", 90, &[]),
        ]);
        let titles: Vec<String> = catalog.top_songs(3).into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["b", "d", "c"]);
        assert_eq!(catalog.top_songs(10).len(), 4);
    }
}
