//! Spotify Web API source (primary).
//!
//! Authenticates with the client-credentials grant. Artist genres and images
//! come from the artist object; release date, album art and popularity from
//! the track and its album.

use super::auth::{ClientCredentials, Credentials};
use super::http::{build_client, HttpSource};
use super::retry::RetryPolicy;
use super::{ArtistInfo, MetadataSource, SongInfo, SourceError};
use crate::config::SpotifySettings;
use crate::models::{parse_release_date, SourceKind};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub struct SpotifySource {
    http: HttpSource,
    api_base: String,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    popularity: Option<u8>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    name: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SimplifiedArtist {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: Option<String>,
    duration_ms: Option<u32>,
    popularity: Option<u8>,
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
    album: Option<SpotifyAlbum>,
    #[serde(default)]
    artists: Vec<SimplifiedArtist>,
}

#[derive(Deserialize)]
struct ArtistPage {
    #[serde(default)]
    items: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SearchResponse {
    artists: Option<ArtistPage>,
    tracks: Option<TrackPage>,
}

impl From<SpotifyArtist> for ArtistInfo {
    fn from(artist: SpotifyArtist) -> Self {
        ArtistInfo {
            id: artist.id,
            name: artist.name,
            genres: artist.genres,
            popularity: artist.popularity,
            image_url: artist.images.into_iter().next().map(|i| i.url),
            link: artist.external_urls.spotify,
        }
    }
}

impl From<SpotifyTrack> for SongInfo {
    fn from(track: SpotifyTrack) -> Self {
        let (album, release_date, image_url) = match track.album {
            Some(album) => (
                album.name,
                album.release_date.as_deref().and_then(parse_release_date),
                album.images.into_iter().next().map(|i| i.url),
            ),
            None => (None, None, None),
        };
        SongInfo {
            id: track.id,
            title: track.name,
            artist_name: track.artists.into_iter().next().map(|a| a.name),
            album,
            duration_ms: track.duration_ms,
            release_date,
            popularity: track.popularity,
            preview_url: track.preview_url,
            image_url,
            link: track.external_urls.spotify,
            genres: Vec::new(),
        }
    }
}

impl SpotifySource {
    pub fn new(settings: &SpotifySettings, retry: RetryPolicy) -> Result<Self, SourceError> {
        let client = build_client(None)?;
        let credentials = match (&settings.client_id, &settings.client_secret) {
            (Some(id), Some(secret)) => Credentials::ClientCredentials(ClientCredentials::new(
                client.clone(),
                settings.token_url.clone(),
                id.clone(),
                secret.clone(),
            )),
            _ => {
                warn!("Spotify credentials not configured, requests will be unauthenticated");
                Credentials::None
            }
        };

        Ok(Self {
            http: HttpSource::new("spotify", client, credentials, retry),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Number of tokens fetched so far, zero when not using client credentials.
    pub fn token_requests(&self) -> usize {
        match self.http.credentials() {
            Credentials::ClientCredentials(flow) => flow.token_requests(),
            _ => 0,
        }
    }

    async fn search(&self, query: &str, kind: &str) -> Result<Option<SearchResponse>, SourceError> {
        let url = format!("{}/search", self.api_base);
        self.http
            .get_json(&url, &[("q", query), ("type", kind), ("limit", "1")])
            .await
    }
}

#[async_trait]
impl MetadataSource for SpotifySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Spotify
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let url = format!("{}/artists/{}", self.api_base, urlencoding::encode(id));
        let artist: Option<SpotifyArtist> = self.http.get_json(&url, &[]).await?;
        Ok(artist.map(ArtistInfo::from))
    }

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let query = format!("artist:{}", name);
        let response = self.search(&query, "artist").await?;
        Ok(response
            .and_then(|r| r.artists)
            .and_then(|page| page.items.into_iter().next())
            .map(ArtistInfo::from))
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError> {
        let url = format!("{}/tracks/{}", self.api_base, urlencoding::encode(id));
        let track: Option<SpotifyTrack> = self.http.get_json(&url, &[]).await?;
        Ok(track.map(SongInfo::from))
    }

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError> {
        let query = format!("track:{} artist:{}", title, artist);
        let response = self.search(&query, "track").await?;
        Ok(response
            .and_then(|r| r.tracks)
            .and_then(|page| page.items.into_iter().next())
            .map(SongInfo::from))
    }
}
