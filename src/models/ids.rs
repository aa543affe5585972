use serde::{Deserialize, Serialize};
use std::fmt;

/// The external metadata services an entity can be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Spotify,
    MusicBrainz,
    LastFm,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Spotify => "spotify",
            SourceKind::MusicBrainz => "musicbrainz",
            SourceKind::LastFm => "lastfm",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source identifiers. Once set, an identifier is never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastfm: Option<String>,
}

impl ExternalIds {
    pub fn get(&self, kind: SourceKind) -> Option<&str> {
        self.slot(kind)
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Set the identifier for `kind` unless one is already known.
    pub fn set_if_absent(&mut self, kind: SourceKind, id: &str) -> bool {
        if id.trim().is_empty() || self.get(kind).is_some() {
            return false;
        }
        *self.slot_mut(kind) = Some(id.to_string());
        true
    }

    /// Copy every identifier from `other` that is missing here.
    pub fn fill_from(&mut self, other: &ExternalIds) -> bool {
        let mut changed = false;
        for kind in [SourceKind::Spotify, SourceKind::MusicBrainz, SourceKind::LastFm] {
            if let Some(id) = other.get(kind) {
                changed |= self.set_if_absent(kind, id);
            }
        }
        changed
    }

    fn slot(&self, kind: SourceKind) -> &Option<String> {
        match kind {
            SourceKind::Spotify => &self.spotify,
            SourceKind::MusicBrainz => &self.musicbrainz,
            SourceKind::LastFm => &self.lastfm,
        }
    }

    fn slot_mut(&mut self, kind: SourceKind) -> &mut Option<String> {
        match kind {
            SourceKind::Spotify => &mut self.spotify,
            SourceKind::MusicBrainz => &mut self.musicbrainz,
            SourceKind::LastFm => &mut self.lastfm,
        }
    }
}
