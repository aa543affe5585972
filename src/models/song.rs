use super::artist::is_blank;
use super::ids::{ExternalIds, SourceKind};
use crate::cache::normalize_key;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    /// Name of the owning artist, resolved against the library's artist list.
    pub artist_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub popularity: u8,
    #[serde(default)]
    pub ids: ExternalIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Per-song tags. Empty means "use the artist's genres".
    #[serde(default)]
    pub genres: Vec<String>,
}

impl Song {
    pub fn new(title: impl Into<String>, artist_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist_name: artist_name.into(),
            ..Default::default()
        }
    }

    pub fn with_spotify_id(mut self, id: impl Into<String>) -> Self {
        self.ids.spotify = Some(id.into());
        self
    }

    /// Storage identity: the primary-source id when known, otherwise
    /// normalized title and artist.
    pub fn identity(&self) -> String {
        match self.ids.get(SourceKind::Spotify) {
            Some(id) => format!("spotify:{}", id),
            None => self.name_key(),
        }
    }

    /// Identity based on names only, stable across id discovery.
    pub fn name_key(&self) -> String {
        format!(
            "{}|{}",
            normalize_key(&self.title),
            normalize_key(&self.artist_name)
        )
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    /// True while any of release date, popularity, image, link or album is
    /// missing.
    pub fn needs_enrichment(&self) -> bool {
        self.release_date.is_none()
            || self.popularity == 0
            || is_blank(&self.image_url)
            || is_blank(&self.link)
            || is_blank(&self.album)
    }
}

/// Parse a release date at day, month or year precision.
///
/// `YYYY-MM` resolves to the first of the month, `YYYY` to January 1st.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = match raw.len() {
        10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
        4 => raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        _ => None,
    };

    if parsed.is_none() {
        warn!("Ignoring unparseable release date: {:?}", raw);
    }
    parsed
}
