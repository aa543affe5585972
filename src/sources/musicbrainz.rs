//! MusicBrainz source (secondary).
//!
//! Rate limited to 1 request per second per MusicBrainz API policy. Genres
//! come from curated genres when present, otherwise from the most voted
//! tags. Image and homepage links come from URL relations.

use super::auth::Credentials;
use super::http::{build_client, HttpSource};
use super::retry::RetryPolicy;
use super::{ArtistInfo, MetadataSource, SongInfo, SourceError};
use crate::config::MusicBrainzSettings;
use crate::models::{parse_release_date, SourceKind};
use async_trait::async_trait;
use serde::Deserialize;

/// At most this many tags are turned into genres.
const MAX_TAG_GENRES: usize = 5;

pub struct MusicBrainzSource {
    http: HttpSource,
    api_base: String,
}

#[derive(Deserialize)]
struct MbTag {
    name: String,
    #[serde(default)]
    count: i64,
}

#[derive(Deserialize)]
struct MbUrl {
    resource: Option<String>,
}

#[derive(Deserialize)]
struct MbRelation {
    #[serde(rename = "type")]
    relation_type: Option<String>,
    url: Option<MbUrl>,
}

#[derive(Deserialize)]
struct MbArtist {
    id: String,
    name: Option<String>,
    #[serde(default)]
    genres: Vec<MbTag>,
    #[serde(default)]
    tags: Vec<MbTag>,
    #[serde(default)]
    relations: Vec<MbRelation>,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<MbArtist>,
}

#[derive(Deserialize)]
struct MbRelease {
    title: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct MbArtistCredit {
    name: String,
}

#[derive(Deserialize)]
struct MbRecording {
    id: String,
    title: Option<String>,
    length: Option<u32>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(default)]
    releases: Vec<MbRelease>,
    #[serde(default, rename = "artist-credit")]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    genres: Vec<MbTag>,
    #[serde(default)]
    tags: Vec<MbTag>,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

fn genres_from(genres: Vec<MbTag>, mut tags: Vec<MbTag>) -> Vec<String> {
    if !genres.is_empty() {
        return genres.into_iter().map(|g| g.name).collect();
    }
    tags.retain(|t| t.count > 0);
    // stable, so equal votes keep the service's order
    tags.sort_by(|a, b| b.count.cmp(&a.count));
    tags.into_iter()
        .take(MAX_TAG_GENRES)
        .map(|t| t.name)
        .collect()
}

fn relation_url<'a>(relations: &'a [MbRelation], relation_type: &str) -> Option<&'a str> {
    relations
        .iter()
        .filter(|rel| rel.relation_type.as_deref() == Some(relation_type))
        .find_map(|rel| rel.url.as_ref().and_then(|u| u.resource.as_deref()))
}

impl From<MbArtist> for ArtistInfo {
    fn from(artist: MbArtist) -> Self {
        let image_url = relation_url(&artist.relations, "image").map(str::to_string);
        let link = relation_url(&artist.relations, "official homepage").map(str::to_string);
        ArtistInfo {
            id: Some(artist.id),
            name: artist.name,
            genres: genres_from(artist.genres, artist.tags),
            popularity: None,
            image_url,
            link,
        }
    }
}

impl From<MbRecording> for SongInfo {
    fn from(recording: MbRecording) -> Self {
        let first_release = recording.releases.into_iter().next();
        let release_date = recording
            .first_release_date
            .or_else(|| first_release.as_ref().and_then(|r| r.date.clone()))
            .as_deref()
            .and_then(parse_release_date);
        SongInfo {
            link: Some(format!("https://musicbrainz.org/recording/{}", recording.id)),
            id: Some(recording.id),
            title: recording.title,
            artist_name: recording.artist_credit.into_iter().next().map(|c| c.name),
            album: first_release.and_then(|r| r.title),
            duration_ms: recording.length,
            release_date,
            genres: genres_from(recording.genres, recording.tags),
            ..Default::default()
        }
    }
}

/// Quote a value for a Lucene search query.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl MusicBrainzSource {
    pub fn new(settings: &MusicBrainzSettings, retry: RetryPolicy) -> Result<Self, SourceError> {
        let client = build_client(Some(&settings.user_agent))?;
        Ok(Self {
            http: HttpSource::new("musicbrainz", client, Credentials::None, retry)
                .with_min_interval(settings.min_interval),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for MusicBrainzSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MusicBrainz
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let url = format!("{}/artist/{}", self.api_base, urlencoding::encode(id));
        let artist: Option<MbArtist> = self
            .http
            .get_json(&url, &[("inc", "genres tags url-rels"), ("fmt", "json")])
            .await?;
        Ok(artist.map(ArtistInfo::from))
    }

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let url = format!("{}/artist/", self.api_base);
        let query = format!("artist:{}", quoted(name));
        let response: Option<ArtistSearchResponse> = self
            .http
            .get_json(&url, &[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .await?;
        Ok(response
            .and_then(|r| r.artists.into_iter().next())
            .map(ArtistInfo::from))
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError> {
        let url = format!("{}/recording/{}", self.api_base, urlencoding::encode(id));
        let recording: Option<MbRecording> = self
            .http
            .get_json(
                &url,
                &[("inc", "releases artist-credits genres tags"), ("fmt", "json")],
            )
            .await?;
        Ok(recording.map(SongInfo::from))
    }

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError> {
        let url = format!("{}/recording/", self.api_base);
        let query = format!("recording:{} AND artist:{}", quoted(title), quoted(artist));
        let response: Option<RecordingSearchResponse> = self
            .http
            .get_json(&url, &[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .await?;
        Ok(response
            .and_then(|r| r.recordings.into_iter().next())
            .map(SongInfo::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_tags_become_genres_by_votes() {
        let artist: MbArtist = serde_json::from_str(
            r#"{
                "id": "a74b1b7f-71a5-4011-9441-d0b5e4122711",
                "name": "Radiohead",
                "tags": [
                    {"name": "british", "count": 3},
                    {"name": "alternative rock", "count": 12},
                    {"name": "spam", "count": -1}
                ],
                "relations": [
                    {"type": "official homepage", "url": {"resource": "https://www.radiohead.com/"}},
                    {"type": "image", "url": {"resource": "https://commons.wikimedia.org/radiohead.jpg"}}
                ]
            }"#,
        )
        .unwrap();

        let info = ArtistInfo::from(artist);
        assert_eq!(info.genres, vec!["alternative rock", "british"]);
        assert_eq!(info.link.as_deref(), Some("https://www.radiohead.com/"));
        assert_eq!(
            info.image_url.as_deref(),
            Some("https://commons.wikimedia.org/radiohead.jpg")
        );
        assert_eq!(info.id.as_deref(), Some("a74b1b7f-71a5-4011-9441-d0b5e4122711"));
    }

    #[test]
    fn test_curated_genres_win_over_tags() {
        let artist: MbArtist = serde_json::from_str(
            r#"{"id": "x", "genres": [{"name": "trip hop", "count": 1}], "tags": [{"name": "bristol", "count": 9}]}"#,
        )
        .unwrap();
        assert_eq!(ArtistInfo::from(artist).genres, vec!["trip hop"]);
    }

    #[test]
    fn test_recording_conversion() {
        let recording: MbRecording = serde_json::from_str(
            r#"{
                "id": "rec-1",
                "title": "Teardrop",
                "length": 330773,
                "first-release-date": "1998",
                "releases": [{"title": "Mezzanine", "date": "1998-04-20"}],
                "artist-credit": [{"name": "Massive Attack"}]
            }"#,
        )
        .unwrap();

        let info = SongInfo::from(recording);
        assert_eq!(info.album.as_deref(), Some("Mezzanine"));
        assert_eq!(info.release_date, NaiveDate::from_ymd_opt(1998, 1, 1));
        assert_eq!(info.duration_ms, Some(330773));
        assert_eq!(info.artist_name.as_deref(), Some("Massive Attack"));
        assert_eq!(
            info.link.as_deref(),
            Some("https://musicbrainz.org/recording/rec-1")
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(quoted(r#"Say "Hi""#), r#""Say \"Hi\"""#);
    }
}
