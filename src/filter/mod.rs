//! Filtering and fuzzy search over the enriched catalog.

mod catalog;
mod criteria;
mod engine;
pub mod fuzzy;
pub mod genres;

pub use catalog::CatalogSnapshot;
pub use criteria::{Bounds, Criteria, FilterError};
pub use engine::FilterEngine;
pub use fuzzy::{fuzzy_filter, levenshtein_distance, Vocabulary};
