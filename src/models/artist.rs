use super::ids::{ExternalIds, SourceKind};
use crate::cache::normalize_key;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(default)]
    pub ids: ExternalIds,
    /// Ordered, first entry is the most relevant. Never cleared once set.
    #[serde(default)]
    pub genres: Vec<String>,
    /// 0-100, zero means unknown.
    #[serde(default)]
    pub popularity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_spotify_id(mut self, id: impl Into<String>) -> Self {
        self.ids.spotify = Some(id.into());
        self
    }

    /// Storage identity: the primary-source id when known, otherwise the
    /// normalized name.
    pub fn identity(&self) -> String {
        match self.ids.get(SourceKind::Spotify) {
            Some(id) => format!("spotify:{}", id),
            None => normalize_key(&self.name),
        }
    }

    /// Normalized name, used to match songs to their artist.
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }

    /// True while genres or the image are missing.
    pub fn needs_enrichment(&self) -> bool {
        self.genres.is_empty() || is_blank(&self.image_url)
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}
