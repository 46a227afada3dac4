//! Catalog store: album, track, artist-credit and tag persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Every multi-row change (album + tracks + credits together) goes through
//! a single transaction so readers never observe a half-written album.
//!
//! - [`combo`]: atomic combo writes and reads
//! - [`maintenance`]: queries used by startup reconciliation
//!
//! # Example
//!
//! ```ignore
//! use music_steward::db::{init_db, save_combo};
//!
//! let pool = init_db("sqlite:catalog.db").await?;
//! let album_id = save_combo(&pool, &mut combo).await?;
//! ```

mod combo;
mod maintenance;

use std::collections::HashMap;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::model::{Album, PlaylistRef, StreamSource, Track, join_credits};

pub use combo::{
    load_combo, replace_album_artist_credits, replace_album_tracks,
    replace_track_artist_credits, save_combo, update_combo, upsert_album,
};
pub use maintenance::{
    LocalRepair, delete_album_rows, delete_orphan_playlist_tracks, delete_temp_rows,
    list_tracks_with_local_uri, repair_local_state,
};

/// How long a connection waits on a locked database.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "catalog.db";

pub(crate) const ALBUM_COLUMNS: &str = "id, title, in_library, is_local, \
    musicbrainz_release_id, musicbrainz_release_group_id, playlist_id, playlist_browse_id, \
    artwork_uri, local_artwork_uri, year, is_deleted, is_hidden, is_temp";

pub(crate) const TRACK_COLUMNS: &str = "id, title, in_library, album_id, album_position, \
    disc_number, year, local_uri, stream_id, stream_url, stream_thumbnail, musicbrainz_id, \
    scrobble_id, duration_ms, play_count, is_temp";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist and opens up to 5
/// connections in WAL mode. Writers that find the database locked wait up
/// to [`BUSY_TIMEOUT`] instead of failing at once.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ============================================================================
// Database Row Types
// ============================================================================

/// Database row for the albums table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AlbumRow {
    id: i64,
    title: String,
    in_library: bool,
    is_local: bool,
    musicbrainz_release_id: Option<String>,
    musicbrainz_release_group_id: Option<String>,
    playlist_id: Option<String>,
    playlist_browse_id: Option<String>,
    artwork_uri: Option<String>,
    local_artwork_uri: Option<String>,
    year: Option<i64>,
    is_deleted: bool,
    is_hidden: bool,
    is_temp: bool,
}

impl From<AlbumRow> for Album {
    fn from(row: AlbumRow) -> Self {
        Album {
            id: Some(row.id),
            title: row.title,
            in_library: row.in_library,
            is_local: row.is_local,
            musicbrainz_release_id: row.musicbrainz_release_id,
            musicbrainz_release_group_id: row.musicbrainz_release_group_id,
            playlist: row.playlist_id.map(|id| PlaylistRef {
                id,
                browse_id: row.playlist_browse_id,
            }),
            artwork_uri: row.artwork_uri,
            local_artwork_uri: row.local_artwork_uri,
            year: row.year.map(|y| y as i32),
            is_deleted: row.is_deleted,
            is_hidden: row.is_hidden,
            is_temp: row.is_temp,
        }
    }
}

/// Database row for the tracks table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TrackRow {
    id: i64,
    title: String,
    in_library: bool,
    album_id: Option<i64>,
    album_position: Option<i64>,
    disc_number: Option<i64>,
    year: Option<i64>,
    local_uri: Option<String>,
    stream_id: Option<String>,
    stream_url: Option<String>,
    stream_thumbnail: Option<String>,
    musicbrainz_id: Option<String>,
    scrobble_id: Option<String>,
    duration_ms: Option<i64>,
    play_count: i64,
    is_temp: bool,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            id: Some(row.id),
            title: row.title,
            in_library: row.in_library,
            album_id: row.album_id,
            album_position: row.album_position.map(|p| p as u32),
            disc_number: row.disc_number.map(|d| d as u32),
            year: row.year.map(|y| y as i32),
            local_uri: row.local_uri,
            stream: row.stream_id.map(|id| StreamSource {
                id,
                url: row.stream_url,
                thumbnail: row.stream_thumbnail,
            }),
            musicbrainz_id: row.musicbrainz_id,
            scrobble_id: row.scrobble_id,
            duration_ms: row.duration_ms.map(|d| d as u64),
            play_count: row.play_count as u32,
            is_temp: row.is_temp,
        }
    }
}

// ============================================================================
// Album Queries
// ============================================================================

/// Get an album by its database ID.
pub async fn get_album(pool: &SqlitePool, album_id: i64) -> sqlx::Result<Option<Album>> {
    let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?");
    let row: Option<AlbumRow> = sqlx::query_as(&sql)
        .bind(album_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Album::from))
}

/// Find the album linked to a streaming playlist.
///
/// Used by the import identity check; a second album carrying the same
/// playlist id must never be created.
pub async fn find_album_by_playlist_id(
    pool: &SqlitePool,
    playlist_id: &str,
) -> sqlx::Result<Option<Album>> {
    let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE playlist_id = ? ORDER BY id LIMIT 1");
    let row: Option<AlbumRow> = sqlx::query_as(&sql)
        .bind(playlist_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Album::from))
}

/// Find the album linked to a MusicBrainz release.
pub async fn find_album_by_release_id(
    pool: &SqlitePool,
    release_id: &str,
) -> sqlx::Result<Option<Album>> {
    let sql = format!(
        "SELECT {ALBUM_COLUMNS} FROM albums WHERE musicbrainz_release_id = ? ORDER BY id LIMIT 1"
    );
    let row: Option<AlbumRow> = sqlx::query_as(&sql)
        .bind(release_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Album::from))
}

/// Albums the user soft-deleted and that are waiting to be purged.
pub async fn list_soft_deleted_albums(pool: &SqlitePool) -> sqlx::Result<Vec<Album>> {
    let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE is_deleted = 1 ORDER BY id");
    let rows: Vec<AlbumRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Album::from).collect())
}

/// Mark an album for deletion. Files and rows are purged by reconciliation.
pub async fn soft_delete_album(pool: &SqlitePool, album_id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE albums SET is_deleted = 1, in_library = 0 WHERE id = ?")
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record where an album's artwork was saved.
pub async fn set_album_local_artwork(
    pool: &SqlitePool,
    album_id: i64,
    uri: &str,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET local_artwork_uri = ? WHERE id = ?")
        .bind(uri)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Album together with its rendered artist string.
///
/// Used for listing and for local identity resolution, which compares
/// `(title, artist)` pairs.
#[derive(Debug, Clone)]
pub struct AlbumSummary {
    pub album: Album,
    pub artist: String,
    pub track_count: i64,
}

/// All live albums (not soft-deleted, not temp) with their artist strings.
pub async fn list_album_summaries(pool: &SqlitePool) -> sqlx::Result<Vec<AlbumSummary>> {
    let sql = format!(
        "SELECT {ALBUM_COLUMNS} FROM albums WHERE is_deleted = 0 AND is_temp = 0 ORDER BY title"
    );
    let rows: Vec<AlbumRow> = sqlx::query_as(&sql).fetch_all(pool).await?;

    let credits: Vec<(i64, String, String)> = sqlx::query_as(
        r#"
        SELECT c.album_id, a.name, c.join_phrase
        FROM album_artist_credits c
        JOIN artists a ON a.id = c.artist_id
        ORDER BY c.album_id, c.position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let counts: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT album_id, COUNT(*) FROM tracks WHERE album_id IS NOT NULL GROUP BY album_id",
    )
    .fetch_all(pool)
    .await?;
    let counts: HashMap<i64, i64> = counts.into_iter().collect();

    let mut by_album: HashMap<i64, Vec<crate::model::ArtistCredit>> = HashMap::new();
    for (album_id, name, join_phrase) in credits {
        by_album
            .entry(album_id)
            .or_default()
            .push(crate::model::ArtistCredit {
                name,
                join_phrase,
                ..Default::default()
            });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let album = Album::from(row);
            let id = album.id.unwrap_or_default();
            let artist = by_album
                .get(&id)
                .map(|c| join_credits(c))
                .unwrap_or_default();
            AlbumSummary {
                album,
                artist,
                track_count: counts.get(&id).copied().unwrap_or(0),
            }
        })
        .collect())
}

// ============================================================================
// Track Queries
// ============================================================================

/// Get a track by its database ID.
pub async fn get_track(pool: &SqlitePool, track_id: i64) -> sqlx::Result<Option<Track>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?");
    let row: Option<TrackRow> = sqlx::query_as(&sql)
        .bind(track_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Track::from))
}

/// Tracks of an album, in disc/position order.
pub async fn get_album_tracks(pool: &SqlitePool, album_id: i64) -> sqlx::Result<Vec<Track>> {
    let sql = format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? \
         ORDER BY COALESCE(disc_number, 1), album_position, id"
    );
    let rows: Vec<TrackRow> = sqlx::query_as(&sql).bind(album_id).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Track::from).collect())
}

/// Every local file reference already in the catalog.
///
/// The local scanner skips these so known files are not imported twice.
pub async fn list_local_uris(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT local_uri FROM tracks WHERE local_uri IS NOT NULL")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(uri,)| uri).collect())
}

/// Record a finished download: set the track's local file and flag its
/// album as local, in one transaction.
///
/// Both statements are writes, so the transaction takes the write lock on
/// its first statement and never has to upgrade a read lock.
pub async fn mark_track_downloaded(
    pool: &SqlitePool,
    track_id: i64,
    local_uri: &str,
) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE tracks SET local_uri = ? WHERE id = ?")
        .bind(local_uri)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE albums SET is_local = 1 WHERE id = (SELECT album_id FROM tracks WHERE id = ?)")
        .bind(track_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

// ============================================================================
// Tags
// ============================================================================

/// All tag names known locally.
pub async fn list_tags(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Insert tag names, ignoring ones that already exist.
///
/// Returns how many were actually new. Never deletes.
pub async fn insert_tags(pool: &SqlitePool, names: &[String]) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for name in names {
        let result = sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
