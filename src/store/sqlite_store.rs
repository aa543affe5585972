//! SQLite-backed metadata store.

use super::schema::METADATA_VERSIONED_SCHEMAS;
use super::trait_def::MetadataStore;
use crate::enrichment::merge::{fill_artist_from, fill_song_from};
use crate::models::{Artist, ExternalIds, Song, SourceKind, UserMusicData};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const UPSERT_ARTIST_SQL: &str = "
    INSERT INTO artists (name_key, name, spotify_id, musicbrainz_id, lastfm_id,
                         genres, popularity, image_url, link, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(name_key) DO UPDATE SET
        spotify_id = COALESCE(artists.spotify_id, excluded.spotify_id),
        musicbrainz_id = COALESCE(artists.musicbrainz_id, excluded.musicbrainz_id),
        lastfm_id = COALESCE(artists.lastfm_id, excluded.lastfm_id),
        genres = CASE WHEN artists.genres = '[]' THEN excluded.genres ELSE artists.genres END,
        popularity = CASE WHEN excluded.popularity > 0 THEN excluded.popularity ELSE artists.popularity END,
        image_url = COALESCE(excluded.image_url, artists.image_url),
        link = COALESCE(excluded.link, artists.link),
        updated_at = excluded.updated_at";

const UPSERT_SONG_SQL: &str = "
    INSERT INTO songs (name_key, title, artist_name, spotify_id, musicbrainz_id, lastfm_id,
                       album, duration_ms, release_date, popularity, preview_url, image_url,
                       link, genres, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
    ON CONFLICT(name_key) DO UPDATE SET
        spotify_id = COALESCE(songs.spotify_id, excluded.spotify_id),
        musicbrainz_id = COALESCE(songs.musicbrainz_id, excluded.musicbrainz_id),
        lastfm_id = COALESCE(songs.lastfm_id, excluded.lastfm_id),
        album = COALESCE(excluded.album, songs.album),
        duration_ms = CASE WHEN excluded.duration_ms > 0 THEN excluded.duration_ms ELSE songs.duration_ms END,
        release_date = COALESCE(excluded.release_date, songs.release_date),
        popularity = CASE WHEN excluded.popularity > 0 THEN excluded.popularity ELSE songs.popularity END,
        preview_url = COALESCE(excluded.preview_url, songs.preview_url),
        image_url = COALESCE(excluded.image_url, songs.image_url),
        link = COALESCE(excluded.link, songs.link),
        genres = CASE WHEN songs.genres = '[]' THEN excluded.genres ELSE songs.genres END,
        updated_at = excluded.updated_at";

const ARTIST_COLUMNS: &str =
    "name, spotify_id, musicbrainz_id, lastfm_id, genres, popularity, image_url, link";

const SONG_COLUMNS: &str = "title, artist_name, spotify_id, musicbrainz_id, lastfm_id, album, \
     duration_ms, release_date, popularity, preview_url, image_url, link, genres";

#[derive(Clone)]
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = METADATA_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &METADATA_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating metadata db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database has tables but no recognized schema version ({})",
            db_version
        );
    }
    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version > latest_version {
        bail!(
            "Database schema version {} is newer than supported version {}",
            current_version,
            latest_version
        );
    }

    if current_version < latest_version {
        let tx = conn.transaction()?;
        for schema in METADATA_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating metadata db from version {} to {}",
                    current_version, schema.version
                );
                migration_fn(&tx)?;
            }
            current_version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    latest_schema.validate(conn)
}

/// Empty strings are stored as NULL so COALESCE keeps older values.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn genres_to_json(genres: &[String]) -> Result<String> {
    serde_json::to_string(genres).context("Failed to encode genres")
}

fn genres_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Ignoring malformed stored genres {:?}: {}", raw, e);
        Vec::new()
    })
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        name: row.get(0)?,
        ids: ExternalIds {
            spotify: row.get(1)?,
            musicbrainz: row.get(2)?,
            lastfm: row.get(3)?,
        },
        genres: genres_from_json(&row.get::<_, String>(4)?),
        popularity: row.get::<_, i64>(5)?.clamp(0, 100) as u8,
        image_url: row.get(6)?,
        link: row.get(7)?,
    })
}

fn song_from_row(row: &Row) -> rusqlite::Result<Song> {
    let release_date = row
        .get::<_, Option<String>>(7)?
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());
    Ok(Song {
        title: row.get(0)?,
        artist_name: row.get(1)?,
        ids: ExternalIds {
            spotify: row.get(2)?,
            musicbrainz: row.get(3)?,
            lastfm: row.get(4)?,
        },
        album: row.get(5)?,
        duration_ms: row.get::<_, i64>(6)?.max(0) as u32,
        release_date,
        popularity: row.get::<_, i64>(8)?.clamp(0, 100) as u8,
        preview_url: row.get(9)?,
        image_url: row.get(10)?,
        link: row.get(11)?,
        genres: genres_from_json(&row.get::<_, String>(12)?),
    })
}

impl SqliteMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open metadata database {:?}", db_path.as_ref()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate_if_needed(&mut conn)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_if_needed(&mut conn)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let artist_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))
            .unwrap_or(0);
        let song_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap_or(0);
        info!(
            "Opened metadata store: {} artists, {} songs",
            artist_count, song_count
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn find_artist(conn: &Connection, artist: &Artist) -> Result<Option<Artist>> {
        if let Some(id) = artist.ids.get(SourceKind::Spotify) {
            let found = conn
                .query_row(
                    &format!("SELECT {} FROM artists WHERE spotify_id = ?1", ARTIST_COLUMNS),
                    params![id],
                    artist_from_row,
                )
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM artists WHERE name_key = ?1", ARTIST_COLUMNS),
                params![artist.key()],
                artist_from_row,
            )
            .optional()?)
    }

    fn find_song(conn: &Connection, song: &Song) -> Result<Option<Song>> {
        if let Some(id) = song.ids.get(SourceKind::Spotify) {
            let found = conn
                .query_row(
                    &format!("SELECT {} FROM songs WHERE spotify_id = ?1", SONG_COLUMNS),
                    params![id],
                    song_from_row,
                )
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM songs WHERE name_key = ?1", SONG_COLUMNS),
                params![song.name_key()],
                song_from_row,
            )
            .optional()?)
    }

    pub fn get_artist(&self, name: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        Self::find_artist(&conn, &Artist::new(name))
    }

    pub fn get_song(&self, title: &str, artist: &str) -> Result<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        Self::find_song(&conn, &Song::new(title, artist))
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn fetch_complete(&self, data: &mut UserMusicData) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for artist in &mut data.artists {
            if let Some(stored) = Self::find_artist(&conn, artist)? {
                fill_artist_from(artist, &stored);
            }
        }
        for song in &mut data.songs {
            if let Some(stored) = Self::find_song(&conn, song)? {
                fill_song_from(song, &stored);
            }
        }
        Ok(())
    }

    fn upsert_enriched(&self, artists: &[Artist], songs: &[Song]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_ARTIST_SQL)?;
            for artist in artists {
                stmt.execute(params![
                    artist.key(),
                    artist.name,
                    artist.ids.get(SourceKind::Spotify),
                    artist.ids.get(SourceKind::MusicBrainz),
                    artist.ids.get(SourceKind::LastFm),
                    genres_to_json(&artist.genres)?,
                    artist.popularity,
                    non_blank(&artist.image_url),
                    non_blank(&artist.link),
                    now,
                ])
                .with_context(|| format!("Failed to upsert artist {}", artist.name))?;
            }

            let mut stmt = tx.prepare_cached(UPSERT_SONG_SQL)?;
            for song in songs {
                stmt.execute(params![
                    song.name_key(),
                    song.title,
                    song.artist_name,
                    song.ids.get(SourceKind::Spotify),
                    song.ids.get(SourceKind::MusicBrainz),
                    song.ids.get(SourceKind::LastFm),
                    non_blank(&song.album),
                    song.duration_ms,
                    song.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    song.popularity,
                    non_blank(&song.preview_url),
                    non_blank(&song.image_url),
                    non_blank(&song.link),
                    genres_to_json(&song.genres)?,
                    now,
                ])
                .with_context(|| format!("Failed to upsert song {}", song.title))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
