mod memory_store;
mod schema;
mod sqlite_store;
mod trait_def;

pub use memory_store::InMemoryMetadataStore;
pub use schema::METADATA_VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteMetadataStore;
pub use trait_def::MetadataStore;
