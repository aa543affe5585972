//! Filter criteria parsed from a loosely typed JSON map.
//!
//! Parsing never fails on individual keys: unknown keys and values of the
//! wrong shape are logged, recorded in [`Criteria::ignored_keys`] and left
//! out of the predicate.

use super::genres::{expand_genre, genre_key};
use crate::cache::normalize_key;
use crate::models::Song;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter criteria must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("Invalid criteria JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Inclusive bounds, either side optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Bounds {
    pub fn at_least(min: i64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: i64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn exactly(value: i64) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// How a bare number is read for a numeric key.
#[derive(Clone, Copy)]
enum Threshold {
    AtLeast,
    AtMost,
    Exactly,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    /// Requested genres as genre keys. A song matches if it carries any.
    pub genres: Vec<String>,
    pub genre_similarity: bool,
    /// Normalized artist name.
    pub artist: Option<String>,
    pub popularity: Option<Bounds>,
    pub duration_ms: Option<Bounds>,
    pub year: Option<Bounds>,
    pub ignored_keys: Vec<String>,
}

impl Criteria {
    pub fn from_json_str(raw: &str) -> Result<Self, FilterError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(FilterError::NotAnObject(json_type(other).to_string())),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut criteria = Criteria::default();
        for (raw_key, value) in map {
            let key = raw_key.trim().to_lowercase();
            let parsed = match key.as_str() {
                "genre" => parse_genres(value).map(|genres| criteria.genres = genres),
                "genre_similarity" => value.as_bool().map(|on| criteria.genre_similarity = on),
                "artist" => value
                    .as_str()
                    .map(normalize_key)
                    .filter(|artist| !artist.is_empty())
                    .map(|artist| criteria.artist = Some(artist)),
                "popularity" => parse_bounds(value, Threshold::AtLeast)
                    .map(|bounds| criteria.popularity = Some(bounds)),
                "duration" => parse_bounds(value, Threshold::AtMost)
                    .map(|bounds| criteria.duration_ms = Some(bounds)),
                "year" => parse_bounds(value, Threshold::Exactly)
                    .map(|bounds| criteria.year = Some(bounds)),
                _ => {
                    warn!("Ignoring unknown filter key '{}'", raw_key);
                    criteria.ignored_keys.push(raw_key.clone());
                    continue;
                }
            };
            if parsed.is_none() {
                warn!("Ignoring filter key '{}' with unusable value {}", raw_key, value);
                criteria.ignored_keys.push(raw_key.clone());
            }
        }
        criteria
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres = genres.into_iter().map(|g| genre_key(g.as_ref())).collect();
        self
    }

    pub fn with_artist(mut self, artist: &str) -> Self {
        self.artist = Some(normalize_key(artist));
        self
    }

    pub fn with_popularity(mut self, bounds: Bounds) -> Self {
        self.popularity = Some(bounds);
        self
    }

    /// True when no predicate is active, so every song matches.
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
            && self.artist.is_none()
            && self.popularity.is_none()
            && self.duration_ms.is_none()
            && self.year.is_none()
    }

    /// Genre keys to look for, synonym-expanded when similarity is on.
    pub fn genre_keys(&self) -> Vec<String> {
        if !self.genre_similarity {
            return self.genres.clone();
        }
        let mut keys: Vec<String> = Vec::new();
        for genre in &self.genres {
            for key in expand_genre(genre) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Every active predicate except the genre one, which the caller resolves
    /// through the genre index.
    pub(crate) fn matches_scalars(&self, song: &Song) -> bool {
        if let Some(artist) = &self.artist {
            if normalize_key(&song.artist_name) != *artist {
                return false;
            }
        }
        if let Some(bounds) = &self.popularity {
            if !bounds.contains(song.popularity as i64) {
                return false;
            }
        }
        if let Some(bounds) = &self.duration_ms {
            if !bounds.contains(song.duration_ms as i64) {
                return false;
            }
        }
        if let Some(bounds) = &self.year {
            match song.release_year() {
                Some(year) if bounds.contains(year as i64) => {}
                _ => return false,
            }
        }
        true
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_genres(value: &Value) -> Option<Vec<String>> {
    let genres: Vec<String> = match value {
        Value::String(genre) => vec![genre_key(genre)],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(genre_key)
            .collect(),
        _ => return None,
    };
    let genres: Vec<String> = genres.into_iter().filter(|g| !g.is_empty()).collect();
    (!genres.is_empty()).then_some(genres)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_bounds(value: &Value, threshold: Threshold) -> Option<Bounds> {
    if let Value::Object(range) = value {
        let min = match range.get("min") {
            Some(v) => Some(parse_integer(v)?),
            None => None,
        };
        let max = match range.get("max") {
            Some(v) => Some(parse_integer(v)?),
            None => None,
        };
        if min.is_none() && max.is_none() {
            return None;
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return None;
            }
        }
        return Some(Bounds { min, max });
    }

    let n = parse_integer(value)?;
    Some(match threshold {
        Threshold::AtLeast => Bounds::at_least(n),
        Threshold::AtMost => Bounds::at_most(n),
        Threshold::Exactly => Bounds::exactly(n),
    })
}
