//! MetadataStore trait definition.

use crate::models::{Artist, Song, UserMusicData};
use anyhow::Result;

/// Durable storage for enriched metadata.
///
/// The enrichment coordinator consults it before calling any source, and
/// hands it the entities a pass changed.
pub trait MetadataStore: Send + Sync {
    /// Fill empty fields of every entity in `data` from its stored copy.
    ///
    /// Entities unknown to the store are left untouched.
    fn fetch_complete(&self, data: &mut UserMusicData) -> Result<()>;

    /// Insert or update the given entities.
    ///
    /// Stored non-empty values are never replaced by empty ones, and a stored
    /// genre list is only replaced while it is empty. External ids keep the
    /// first value stored.
    ///
    /// Concurrent writers are last-writer-wins per scalar field: a non-empty
    /// value overwrites whatever another writer stored since this caller's
    /// `fetch_complete`. `updated_at` records the write and is not compared.
    fn upsert_enriched(&self, artists: &[Artist], songs: &[Song]) -> Result<()>;
}
