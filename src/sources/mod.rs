//! External metadata sources.
//!
//! Each source answers lookups by its own identifier or by name with a
//! partial record in a common shape. Sources are ordered by priority:
//! Spotify is the primary, MusicBrainz the secondary and Last.fm the
//! tertiary fallback.

mod auth;
mod cached;
mod error;
mod http;
pub mod lastfm;
pub mod musicbrainz;
mod retry;
pub mod spotify;

pub use auth::{ClientCredentials, Credentials};
pub use cached::CachedSource;
pub use error::SourceError;
pub use http::{build_client, HttpSource};
pub use lastfm::LastFmSource;
pub use musicbrainz::MusicBrainzSource;
pub use retry::RetryPolicy;
pub use spotify::SpotifySource;

use crate::models::SourceKind;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Partial artist record as answered by one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u8>,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

impl ArtistInfo {
    /// True when the answer carries nothing that could be merged.
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
            && self.popularity.unwrap_or(0) == 0
            && blank(&self.image_url)
            && blank(&self.link)
            && blank(&self.id)
    }
}

/// Partial song record as answered by one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist_name: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u32>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<u8>,
    pub preview_url: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl SongInfo {
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
            && self.popularity.unwrap_or(0) == 0
            && self.duration_ms.unwrap_or(0) == 0
            && self.release_date.is_none()
            && blank(&self.album)
            && blank(&self.preview_url)
            && blank(&self.image_url)
            && blank(&self.link)
            && blank(&self.id)
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// A metadata service that can be asked about artists and songs.
///
/// `Ok(None)` means the source has no match. Errors are failures that
/// survived the adapter's own retries.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError>;

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError>;

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError>;

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError>;
}
