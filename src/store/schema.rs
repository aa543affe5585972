//! SQLite schema for enriched metadata.
//!
//! Rows are keyed by normalized names so an entity keeps its row when a
//! source id is discovered later. Genres are stored as a JSON array.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

const UPDATED_AT_DEFAULT: &str = "(cast(strftime('%s','now') as int))";

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("name_key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("musicbrainz_id", &SqlType::Text),
        sqlite_column!("lastfm_id", &SqlType::Text),
        sqlite_column!(
            "genres",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "popularity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("link", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(UPDATED_AT_DEFAULT)
        ),
    ],
    indices: &[("idx_artists_spotify_id", "spotify_id")],
};

const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("name_key", &SqlType::Text, is_primary_key = true), // "title|artist"
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("musicbrainz_id", &SqlType::Text),
        sqlite_column!("lastfm_id", &SqlType::Text),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!(
            "duration_ms",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("release_date", &SqlType::Text), // YYYY-MM-DD
        sqlite_column!(
            "popularity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("preview_url", &SqlType::Text),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("link", &SqlType::Text),
        sqlite_column!(
            "genres",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(UPDATED_AT_DEFAULT)
        ),
    ],
    indices: &[
        ("idx_songs_spotify_id", "spotify_id"),
        ("idx_songs_artist_name", "artist_name"),
    ],
};

pub const METADATA_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ARTISTS_TABLE, SONGS_TABLE],
    migration: None,
}];
