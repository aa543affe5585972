//! Enrichment pipeline: merge rules, the coordinator that drives sources
//! over a worker pool, and the per-pass report.

mod coordinator;
pub mod merge;
mod report;

pub use coordinator::EnrichmentCoordinator;
pub use merge::{merge_artist, merge_song};
pub use report::{EnrichmentReport, TaskOutcome};

use thiserror::Error;

/// Errors surfaced by an enrichment pass.
///
/// Source failures and timeouts never show up here: they are logged and
/// counted in the [`EnrichmentReport`].
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Failed to persist enriched metadata: {0:#}")]
    Persistence(anyhow::Error),

    #[error("Enrichment coordinator is shutting down")]
    ShuttingDown,
}
