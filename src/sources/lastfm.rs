//! Last.fm source (tertiary).
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines. Top tags
//! become genres. Last.fm reports some failures as an `error` code inside a
//! successful response, those are mapped here.

use super::auth::Credentials;
use super::http::{build_client, HttpSource};
use super::retry::RetryPolicy;
use super::{ArtistInfo, MetadataSource, SongInfo, SourceError};
use crate::config::LastFmSettings;
use crate::models::SourceKind;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Last.fm serves this image for every artist without a picture.
const PLACEHOLDER_IMAGE: &str = "2a96cbd8b46e442fc41c2b86b821562f";

const ERROR_INVALID_API_KEY: i64 = 10;
const ERROR_NOT_FOUND: i64 = 6;
const ERROR_SERVICE_OFFLINE: i64 = 11;
const ERROR_TEMPORARY: i64 = 16;
const ERROR_SUSPENDED_KEY: i64 = 26;
const ERROR_RATE_LIMIT: i64 = 29;

pub struct LastFmSource {
    http: HttpSource,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct LfmImage {
    #[serde(rename = "#text", default)]
    url: String,
}

#[derive(Deserialize)]
struct LfmArtist {
    name: Option<String>,
    mbid: Option<String>,
    url: Option<String>,
    #[serde(default)]
    image: Vec<LfmImage>,
    #[serde(default)]
    tags: Value,
}

#[derive(Deserialize)]
struct LfmAlbum {
    title: Option<String>,
    #[serde(default)]
    image: Vec<LfmImage>,
}

#[derive(Deserialize)]
struct LfmTrackArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct LfmTrack {
    name: Option<String>,
    mbid: Option<String>,
    url: Option<String>,
    #[serde(default)]
    duration: Value,
    artist: Option<LfmTrackArtist>,
    album: Option<LfmAlbum>,
    #[serde(default)]
    toptags: Value,
}

#[derive(Deserialize)]
struct Envelope {
    artist: Option<LfmArtist>,
    track: Option<LfmTrack>,
    error: Option<i64>,
    message: Option<String>,
}

/// Tag names from a `{"tag": [...]}` container.
///
/// Last.fm sends a single object instead of an array for one tag and an
/// empty string instead of an object for none.
fn tag_names(container: &Value) -> Vec<String> {
    let tag = match container.get("tag") {
        Some(tag) => tag,
        None => return Vec::new(),
    };
    let name_of = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_string);
    match tag {
        Value::Array(tags) => tags.iter().filter_map(name_of).collect(),
        Value::Object(_) => name_of(tag).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn largest_image(images: &[LfmImage]) -> Option<String> {
    images
        .iter()
        .rev()
        .map(|i| i.url.trim())
        .find(|url| !url.is_empty() && !url.contains(PLACEHOLDER_IMAGE))
        .map(str::to_string)
}

fn parse_duration(value: &Value) -> Option<u32> {
    let ms = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    u32::try_from(ms).ok().filter(|ms| *ms > 0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<LfmArtist> for ArtistInfo {
    fn from(artist: LfmArtist) -> Self {
        ArtistInfo {
            id: non_empty(artist.mbid),
            name: artist.name,
            genres: tag_names(&artist.tags),
            popularity: None,
            image_url: largest_image(&artist.image),
            link: non_empty(artist.url),
        }
    }
}

impl From<LfmTrack> for SongInfo {
    fn from(track: LfmTrack) -> Self {
        let (album, image_url) = match track.album {
            Some(album) => (non_empty(album.title), largest_image(&album.image)),
            None => (None, None),
        };
        SongInfo {
            id: non_empty(track.mbid),
            title: track.name,
            artist_name: track.artist.and_then(|a| a.name),
            album,
            duration_ms: parse_duration(&track.duration),
            image_url,
            link: non_empty(track.url),
            genres: tag_names(&track.toptags),
            ..Default::default()
        }
    }
}

fn check_error(envelope: &Envelope) -> Result<bool, SourceError> {
    let code = match envelope.error {
        Some(code) => code,
        None => return Ok(true),
    };
    let message = envelope.message.clone().unwrap_or_default();
    match code {
        ERROR_NOT_FOUND => Ok(false),
        ERROR_RATE_LIMIT => Err(SourceError::RateLimited),
        ERROR_INVALID_API_KEY | ERROR_SUSPENDED_KEY => Err(SourceError::Auth(message)),
        ERROR_SERVICE_OFFLINE | ERROR_TEMPORARY => Err(SourceError::Api {
            status: 503,
            message,
        }),
        _ => Err(SourceError::Api {
            status: 400,
            message: format!("Last.fm error {}: {}", code, message),
        }),
    }
}

impl LastFmSource {
    pub fn new(settings: &LastFmSettings, retry: RetryPolicy) -> Result<Self, SourceError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| SourceError::Auth("Last.fm api_key is not configured".to_string()))?;
        let client = build_client(None)?;
        Ok(Self {
            http: HttpSource::new("lastfm", client, Credentials::None, retry)
                .with_min_interval(settings.min_interval),
            api_base: settings.api_base.clone(),
            api_key,
        })
    }

    async fn call(&self, params: &[(&str, &str)]) -> Result<Option<Envelope>, SourceError> {
        let mut query = vec![("api_key", self.api_key.as_str()), ("format", "json")];
        query.extend_from_slice(params);
        self.http
            .get_json_checked(&self.api_base, &query, |envelope: Envelope| {
                Ok(check_error(&envelope)?.then_some(envelope))
            })
            .await
    }
}

#[async_trait]
impl MetadataSource for LastFmSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LastFm
    }

    async fn artist_by_id(&self, id: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let envelope = self.call(&[("method", "artist.getinfo"), ("mbid", id)]).await?;
        Ok(envelope.and_then(|e| e.artist).map(ArtistInfo::from))
    }

    async fn artist_by_name(&self, name: &str) -> Result<Option<ArtistInfo>, SourceError> {
        let envelope = self
            .call(&[
                ("method", "artist.getinfo"),
                ("artist", name),
                ("autocorrect", "1"),
            ])
            .await?;
        Ok(envelope.and_then(|e| e.artist).map(ArtistInfo::from))
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<SongInfo>, SourceError> {
        let envelope = self.call(&[("method", "track.getinfo"), ("mbid", id)]).await?;
        Ok(envelope.and_then(|e| e.track).map(SongInfo::from))
    }

    async fn song_by_name(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<SongInfo>, SourceError> {
        let envelope = self
            .call(&[
                ("method", "track.getinfo"),
                ("artist", artist),
                ("track", title),
                ("autocorrect", "1"),
            ])
            .await?;
        Ok(envelope.and_then(|e| e.track).map(SongInfo::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artist_getinfo_conversion() {
        let envelope: Envelope = serde_json::from_str(
            r##"{"artist": {
                "name": "Cher",
                "mbid": "bfcc6d75-a6a5-4bc6-8282-47aec8531818",
                "url": "https://www.last.fm/music/Cher",
                "image": [
                    {"#text": "https://lastfm.freetls.fastly.net/i/u/34s/cher.png", "size": "small"},
                    {"#text": "https://lastfm.freetls.fastly.net/i/u/300x300/cher.png", "size": "extralarge"},
                    {"#text": "", "size": "mega"}
                ],
                "tags": {"tag": [{"name": "pop"}, {"name": "dance"}]}
            }}"##,
        )
        .unwrap();

        let info = ArtistInfo::from(envelope.artist.unwrap());
        assert_eq!(info.genres, vec!["pop", "dance"]);
        assert_eq!(
            info.image_url.as_deref(),
            Some("https://lastfm.freetls.fastly.net/i/u/300x300/cher.png")
        );
        assert_eq!(info.link.as_deref(), Some("https://www.last.fm/music/Cher"));
    }

    #[test]
    fn test_placeholder_image_is_ignored() {
        let images = vec![LfmImage {
            url: format!("https://lastfm.freetls.fastly.net/i/u/300x300/{}.png", PLACEHOLDER_IMAGE),
        }];
        assert_eq!(largest_image(&images), None);
    }

    #[test]
    fn test_tag_shapes() {
        assert_eq!(
            tag_names(&serde_json::json!({"tag": {"name": "jazz"}})),
            vec!["jazz"]
        );
        assert!(tag_names(&serde_json::json!("")).is_empty());
        assert!(tag_names(&Value::Null).is_empty());
    }

    #[test]
    fn test_track_duration_as_string() {
        let track: LfmTrack = serde_json::from_str(
            r#"{"name": "Believe", "duration": "239000", "album": {"title": "Believe", "image": []}, "toptags": {"tag": []}}"#,
        )
        .unwrap();
        let info = SongInfo::from(track);
        assert_eq!(info.duration_ms, Some(239000));
        assert_eq!(info.album.as_deref(), Some("Believe"));

        assert_eq!(parse_duration(&serde_json::json!("0")), None);
        assert_eq!(parse_duration(&serde_json::json!(1000)), Some(1000));
    }

    #[test]
    fn test_error_codes() {
        let envelope = |code: i64| Envelope {
            artist: None,
            track: None,
            error: Some(code),
            message: Some("msg".into()),
        };

        assert_eq!(check_error(&envelope(ERROR_NOT_FOUND)), Ok(false));
        assert_eq!(
            check_error(&envelope(ERROR_RATE_LIMIT)),
            Err(SourceError::RateLimited)
        );
        assert!(matches!(
            check_error(&envelope(ERROR_INVALID_API_KEY)),
            Err(SourceError::Auth(_))
        ));
        assert!(check_error(&envelope(ERROR_TEMPORARY))
            .unwrap_err()
            .is_retryable());
    }
}
