//! Domain model for the user's music library.

mod artist;
mod ids;
mod song;

pub use artist::Artist;
pub use ids::{ExternalIds, SourceKind};
pub use song::{parse_release_date, Song};

use serde::{Deserialize, Serialize};

/// A user's library: the artists and songs to enrich and recommend from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMusicData {
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl UserMusicData {
    pub fn new(artists: Vec<Artist>, songs: Vec<Song>) -> Self {
        Self { artists, songs }
    }

    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.songs.is_empty()
    }

    /// Find the library artist a song belongs to, matched on normalized name.
    pub fn artist_for(&self, song: &Song) -> Option<&Artist> {
        let wanted = crate::cache::normalize_key(&song.artist_name);
        self.artists.iter().find(|a| a.key() == wanted)
    }

    /// Copy artist genres onto songs that carry none of their own.
    ///
    /// Returns how many songs were changed.
    pub fn inherit_artist_genres(&mut self) -> usize {
        let mut by_artist = std::collections::HashMap::new();
        for artist in &self.artists {
            if !artist.genres.is_empty() {
                by_artist.insert(artist.key(), artist.genres.clone());
            }
        }

        let mut changed = 0;
        for song in &mut self.songs {
            if !song.genres.is_empty() {
                continue;
            }
            if let Some(genres) = by_artist.get(&crate::cache::normalize_key(&song.artist_name)) {
                song.genres = genres.clone();
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artist_for_matches_normalized_name() {
        let mut artist = Artist::new("The Weeknd");
        artist.genres = vec!["r&b".to_string()];
        let songs = vec![Song::new("Blinding Lights", "the weeknd")];
        let data = UserMusicData::new(vec![artist], songs);

        let found = data.artist_for(&data.songs[0]).unwrap();
        assert_eq!(found.name, "The Weeknd");
    }

    #[test]
    fn test_inherit_artist_genres_only_fills_empty() {
        let mut artist = Artist::new("Daft Punk");
        artist.genres = vec!["house".to_string()];
        let mut tagged = Song::new("Aerodynamic", "Daft Punk");
        tagged.genres = vec!["electronic".to_string()];
        let mut data = UserMusicData::new(
            vec![artist],
            vec![Song::new("One More Time", "Daft Punk"), tagged, Song::new("Hello", "Adele")],
        );

        assert_eq!(data.inherit_artist_genres(), 1);
        assert_eq!(data.songs[0].genres, vec!["house"]);
        assert_eq!(data.songs[1].genres, vec!["electronic"]);
        assert!(data.songs[2].genres.is_empty());
    }
}
