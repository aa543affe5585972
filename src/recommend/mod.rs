//! Playlist candidates from listening history and popularity.

mod engine;
pub mod ranking;

pub use engine::RecommendationEngine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMode {
    /// Preferred genres, then preferred artists.
    #[default]
    Personalized,
    /// Half personalized, the rest trending.
    Hybrid,
    /// Mostly personalized, the rest drawn from the discovery pool.
    Surprise,
}

impl RecommendationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationMode::Personalized => "personalized",
            RecommendationMode::Hybrid => "hybrid",
            RecommendationMode::Surprise => "surprise",
        }
    }
}

impl fmt::Display for RecommendationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personalized" | "standard" => Ok(RecommendationMode::Personalized),
            "hybrid" => Ok(RecommendationMode::Hybrid),
            "surprise" => Ok(RecommendationMode::Surprise),
            other => Err(format!("Unknown recommendation mode: {}", other)),
        }
    }
}
