use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub cache_dir: Option<String>,
    pub db_path: Option<String>,

    // Feature configs
    pub enrichment: Option<EnrichmentConfig>,
    pub retry: Option<RetryConfig>,
    pub cache: Option<CacheConfig>,
    pub recommendation: Option<RecommendationConfig>,
    pub spotify: Option<SpotifyConfig>,
    pub musicbrainz: Option<MusicBrainzConfig>,
    pub lastfm: Option<LastFmConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub workers: Option<usize>,
    pub task_timeout_ms: Option<u64>,
    pub batch_deadline_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    /// "always" or "require_primary_hit"
    pub fallback_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    pub persistent: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RecommendationConfig {
    pub cache_ttl_secs: Option<u64>,
    pub surprise_ratio: Option<f64>,
    pub discovery_genre: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub user_agent: Option<String>,
    pub api_base: Option<String>,
    pub min_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LastFmConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub min_interval_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
