mod file_config;

pub use file_config::{
    CacheConfig, EnrichmentConfig, FileConfig, LastFmConfig, MusicBrainzConfig,
    RecommendationConfig, RetryConfig, SpotifyConfig,
};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub cache_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub no_persistent_cache: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cache_dir: PathBuf,
    pub db_path: Option<PathBuf>,

    // Feature configs (with defaults)
    pub enrichment: EnrichmentSettings,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
    pub recommendation: RecommendationSettings,
    pub spotify: SpotifySettings,
    pub musicbrainz: MusicBrainzSettings,
    pub lastfm: LastFmSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present. Credentials missing
    /// from the file are read from the environment.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        Self::resolve_with_env(cli, file_config, |key| std::env::var(key).ok())
    }

    pub fn resolve_with_env<F>(
        cli: &CliConfig,
        file_config: Option<FileConfig>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file_config.unwrap_or_default();

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from("cache"));

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone());

        let enrichment_file = file.enrichment.unwrap_or_default();
        let defaults = EnrichmentSettings::default();
        let fallback_policy = match enrichment_file.fallback_policy {
            Some(raw) => raw.parse()?,
            None => defaults.fallback_policy,
        };
        let enrichment = EnrichmentSettings {
            workers: enrichment_file
                .workers
                .or(cli.workers)
                .unwrap_or(defaults.workers),
            task_timeout: enrichment_file
                .task_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.task_timeout),
            batch_deadline: enrichment_file
                .batch_deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_deadline),
            shutdown_grace: enrichment_file
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            fallback_policy,
        };
        if enrichment.workers == 0 {
            bail!("enrichment.workers must be at least 1");
        }
        if enrichment.task_timeout.is_zero() || enrichment.batch_deadline.is_zero() {
            bail!("enrichment timeouts must be greater than zero");
        }

        let retry_file = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            max_attempts: retry_file.max_attempts.unwrap_or(3),
            base_delay_ms: retry_file.base_delay_ms.unwrap_or(1000),
        };
        if retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            ttl: Duration::from_secs(cache_file.ttl_secs.unwrap_or(86400)),
            persistent: cache_file.persistent.unwrap_or(!cli.no_persistent_cache),
        };

        let rec_file = file.recommendation.unwrap_or_default();
        let rec_defaults = RecommendationSettings::default();
        let recommendation = RecommendationSettings {
            cache_ttl: rec_file
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(rec_defaults.cache_ttl),
            surprise_ratio: rec_file
                .surprise_ratio
                .unwrap_or(rec_defaults.surprise_ratio),
            discovery_genre: rec_file
                .discovery_genre
                .unwrap_or(rec_defaults.discovery_genre),
        };
        if !(0.0..=1.0).contains(&recommendation.surprise_ratio) {
            bail!(
                "recommendation.surprise_ratio must be between 0 and 1, got {}",
                recommendation.surprise_ratio
            );
        }

        let spotify_file = file.spotify.unwrap_or_default();
        let spotify_defaults = SpotifySettings::default();
        let spotify = SpotifySettings {
            client_id: spotify_file
                .client_id
                .or_else(|| env("SPOTIFY_CLIENT_ID")),
            client_secret: spotify_file
                .client_secret
                .or_else(|| env("SPOTIFY_CLIENT_SECRET")),
            api_base: spotify_file.api_base.unwrap_or(spotify_defaults.api_base),
            token_url: spotify_file.token_url.unwrap_or(spotify_defaults.token_url),
        };

        let mb_file = file.musicbrainz.unwrap_or_default();
        let mb_defaults = MusicBrainzSettings::default();
        let musicbrainz = MusicBrainzSettings {
            user_agent: mb_file.user_agent.unwrap_or(mb_defaults.user_agent),
            api_base: mb_file.api_base.unwrap_or(mb_defaults.api_base),
            min_interval: mb_file
                .min_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(mb_defaults.min_interval),
        };

        let lastfm_file = file.lastfm.unwrap_or_default();
        let lastfm_defaults = LastFmSettings::default();
        let lastfm = LastFmSettings {
            api_key: lastfm_file.api_key.or_else(|| env("LASTFM_API_KEY")),
            api_base: lastfm_file.api_base.unwrap_or(lastfm_defaults.api_base),
            min_interval: lastfm_file
                .min_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(lastfm_defaults.min_interval),
        };

        Ok(Self {
            cache_dir,
            db_path,
            enrichment,
            retry,
            cache,
            recommendation,
            spotify,
            musicbrainz,
            lastfm,
        })
    }
}

/// Whether fallback sources are consulted when a by-id primary lookup
/// comes back empty or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Consult fallbacks whenever the entity is still incomplete.
    #[default]
    Always,
    /// On the by-id path, only consult fallbacks after a primary hit.
    RequirePrimaryHit,
}

impl FromStr for FallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "always" => Ok(FallbackPolicy::Always),
            "require_primary_hit" => Ok(FallbackPolicy::RequirePrimaryHit),
            other => bail!("Unknown fallback policy: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Size of the worker pool shared by every pass.
    pub workers: usize,
    pub task_timeout: Duration,
    pub batch_deadline: Duration,
    pub shutdown_grace: Duration,
    pub fallback_policy: FallbackPolicy,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            task_timeout: Duration::from_secs(5),
            batch_deadline: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(5),
            fallback_policy: FallbackPolicy::Always,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub persistent: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86400), // 24 hours
            persistent: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub cache_ttl: Duration,
    /// Share of a surprise list taken from the regular ranking.
    pub surprise_ratio: f64,
    /// Genre tag marking songs eligible for the surprise pool.
    pub discovery_genre: String,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(600),
            surprise_ratio: 0.8,
            discovery_genre: "discovery".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: String,
    pub token_url: String,
}

impl SpotifySettings {
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MusicBrainzSettings {
    pub user_agent: String,
    pub api_base: String,
    pub min_interval: Duration,
}

impl Default for MusicBrainzSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("catalog-enricher/", env!("CARGO_PKG_VERSION")).to_string(),
            api_base: "https://musicbrainz.org/ws/2".to_string(),
            min_interval: Duration::from_millis(1100), // slightly over 1s for safety
        }
    }
}

#[derive(Debug, Clone)]
pub struct LastFmSettings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub min_interval: Duration,
}

impl Default for LastFmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://ws.audioscrobbler.com/2.0/".to_string(),
            min_interval: Duration::from_millis(200), // 5 req/sec
        }
    }
}
