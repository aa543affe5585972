//! Music metadata enrichment and recommendation library.
//!
//! This module exposes the internal components for use in integration tests
//! and the `catalog-enricher` binary.

pub mod cache;
pub mod config;
pub mod enrichment;
pub mod filter;
pub mod models;
pub mod recommend;
pub mod sources;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types
pub use cache::{normalize_key, TieredCache};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use enrichment::{EnrichmentCoordinator, EnrichmentError, EnrichmentReport};
pub use filter::{Criteria, FilterEngine};
pub use models::{Artist, ExternalIds, Song, SourceKind, UserMusicData};
pub use recommend::{RecommendationEngine, RecommendationMode};
pub use sources::{MetadataSource, SourceError};
pub use store::{InMemoryMetadataStore, MetadataStore, SqliteMetadataStore};
