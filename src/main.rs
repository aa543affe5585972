use anyhow::{Context, Result};
use catalog_enricher::cache::{JsonFileTier, NoPersistence, PersistentTier};
use catalog_enricher::config::{AppConfig, CliConfig, FileConfig};
use catalog_enricher::filter::Criteria;
use catalog_enricher::sources::{
    CachedSource, LastFmSource, MetadataSource, MusicBrainzSource, RetryPolicy, SpotifySource,
};
use catalog_enricher::{
    EnrichmentCoordinator, FilterEngine, InMemoryMetadataStore, MetadataStore,
    RecommendationEngine, RecommendationMode, Song, SqliteMetadataStore, TieredCache,
    UserMusicData,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Enrich music metadata and build playlist candidates")]
struct CliArgs {
    /// Path to a TOML config file. Its values override command line flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for the on-disk lookup cache.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Path to the SQLite database holding enriched metadata.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill in missing metadata for a library and store the result.
    Enrich {
        /// JSON file with `artists` and `songs`.
        #[clap(value_parser = parse_path)]
        user_data: PathBuf,

        /// Write the enriched library here.
        #[clap(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,

        /// Number of concurrent lookups.
        #[clap(long)]
        workers: Option<usize>,

        /// Keep the lookup cache in memory only.
        #[clap(long)]
        no_persistent_cache: bool,
    },
    /// Recommend songs from a catalog.
    Recommend {
        #[clap(value_parser = parse_path)]
        catalog: PathBuf,

        /// JSON array of songs the user listened to.
        #[clap(long, value_parser = parse_path)]
        history: Option<PathBuf>,

        #[clap(short = 'n', long, default_value_t = 10)]
        max_results: usize,

        #[clap(long, default_value = "personalized")]
        mode: RecommendationMode,

        /// Only keep songs whose title or artist contains this word.
        #[clap(long)]
        mood: Option<String>,
    },
    /// Filter a catalog with a JSON criteria object.
    Filter {
        #[clap(value_parser = parse_path)]
        catalog: PathBuf,

        /// e.g. '{"genre": ["rock", "pop"], "popularity": 50}'
        criteria: String,
    },
    /// Typo-tolerant search over titles and artists.
    Search {
        #[clap(value_parser = parse_path)]
        catalog: PathBuf,

        text: String,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_cache(config: &AppConfig) -> Arc<TieredCache> {
    let tier: Box<dyn PersistentTier> = if config.cache.persistent {
        match JsonFileTier::open(&config.cache_dir) {
            Ok(tier) => Box::new(tier),
            Err(e) => {
                warn!(
                    "Cannot use cache directory {:?}, caching in memory only: {}",
                    config.cache_dir, e
                );
                Box::new(NoPersistence)
            }
        }
    } else {
        Box::new(NoPersistence)
    };
    Arc::new(TieredCache::new(tier))
}

fn build_sources(
    config: &AppConfig,
    cache: &Arc<TieredCache>,
) -> Result<(Arc<dyn MetadataSource>, Vec<Arc<dyn MetadataSource>>)> {
    let retry = RetryPolicy::new(&config.retry);
    let cached = |source: Arc<dyn MetadataSource>| -> Arc<dyn MetadataSource> {
        Arc::new(CachedSource::new(source, cache.clone(), config.cache.ttl))
    };

    let primary = cached(Arc::new(SpotifySource::new(&config.spotify, retry.clone())?));

    let mut fallbacks = vec![cached(Arc::new(MusicBrainzSource::new(
        &config.musicbrainz,
        retry.clone(),
    )?))];
    match LastFmSource::new(&config.lastfm, retry) {
        Ok(source) => fallbacks.push(cached(Arc::new(source))),
        Err(e) => warn!("Last.fm disabled: {}", e),
    }
    Ok((primary, fallbacks))
}

fn build_store(config: &AppConfig) -> Result<Arc<dyn MetadataStore>> {
    match &config.db_path {
        Some(path) => {
            info!("Opening metadata database at {:?}...", path);
            Ok(Arc::new(SqliteMetadataStore::new(path)?))
        }
        None => {
            warn!("No --db-path given, enriched metadata will not outlive this run");
            Ok(Arc::new(InMemoryMetadataStore::new()))
        }
    }
}

async fn run_enrich(config: AppConfig, user_data: &Path, output: Option<&Path>) -> Result<()> {
    let mut data: UserMusicData = read_json(user_data)?;
    info!(
        "Loaded {} artists and {} songs from {:?}",
        data.artists.len(),
        data.songs.len(),
        user_data
    );

    let cache = build_cache(&config);
    let purged = cache.purge_expired();
    if purged > 0 {
        info!("Purged {} expired cache entries", purged);
    }
    let (primary, fallbacks) = build_sources(&config, &cache)?;
    let store = build_store(&config)?;

    let coordinator = Arc::new(EnrichmentCoordinator::new(
        primary,
        fallbacks,
        store,
        config.enrichment.clone(),
    ));

    let signal_coordinator = coordinator.clone();
    let grace = config.enrichment.shutdown_grace;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, letting in-flight lookups finish...");
            signal_coordinator.shutdown(grace).await;
        }
    });

    let report = coordinator.enrich(&mut data).await?;
    info!("Cache: {:?}", cache.stats());

    if let Some(output) = output {
        std::fs::write(output, serde_json::to_string_pretty(&data)?)
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("Enriched library written to {:?}", output);
    }
    print_json(&report)
}

fn run_recommend(
    config: &AppConfig,
    catalog: &Path,
    history: Option<&Path>,
    max_results: usize,
    mode: RecommendationMode,
    mood: Option<&str>,
) -> Result<()> {
    let data: UserMusicData = read_json(catalog)?;
    let history: Vec<Song> = match history {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let engine = RecommendationEngine::new(
        Arc::new(FilterEngine::new(&data)),
        config.recommendation.clone(),
    );
    let songs = match mood {
        Some(mood) => engine.by_mood(&history, mood, max_results),
        None => engine.recommend_with_mode(&history, max_results, mode),
    };
    print_json(&songs)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };

    let (workers, no_persistent_cache) = match &cli_args.command {
        Command::Enrich {
            workers,
            no_persistent_cache,
            ..
        } => (*workers, *no_persistent_cache),
        _ => (None, false),
    };
    let cli_config = CliConfig {
        cache_dir: cli_args.cache_dir.clone(),
        db_path: cli_args.db_path.clone(),
        workers,
        no_persistent_cache,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    match cli_args.command {
        Command::Enrich {
            user_data, output, ..
        } => run_enrich(config, &user_data, output.as_deref()).await,
        Command::Recommend {
            catalog,
            history,
            max_results,
            mode,
            mood,
        } => run_recommend(
            &config,
            &catalog,
            history.as_deref(),
            max_results,
            mode,
            mood.as_deref(),
        ),
        Command::Filter { catalog, criteria } => {
            let data: UserMusicData = read_json(&catalog)?;
            let criteria = Criteria::from_json_str(&criteria)?;
            if !criteria.ignored_keys.is_empty() {
                warn!("Filter ran without: {}", criteria.ignored_keys.join(", "));
            }
            print_json(&FilterEngine::new(&data).filter(&criteria))
        }
        Command::Search { catalog, text } => {
            let data: UserMusicData = read_json(&catalog)?;
            print_json(&FilterEngine::new(&data).search(&text))
        }
    }
}
