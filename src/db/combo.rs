//! Atomic combo persistence.
//!
//! A [`Combo`] is written as one unit: album upsert, tracklist replacement,
//! artist credits for the album and every track, and album tags. The
//! building blocks take a `&mut SqliteConnection` so callers can compose
//! them inside their own transaction.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;

use super::{ALBUM_COLUMNS, AlbumRow, TRACK_COLUMNS, TrackRow};
use crate::model::{Album, ArtistCredit, ArtistCredits, Combo, Track, TrackCombo};

/// Persist a combo in one transaction.
///
/// Ids assigned by the database are written back into `combo` (album,
/// tracks and credited artists). Returns the album id.
pub async fn save_combo(pool: &SqlitePool, combo: &mut Combo) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;
    let album_id = write_combo(&mut tx, combo).await?;
    tx.commit().await?;
    Ok(album_id)
}

/// Re-read an album, let `change` edit it and save it, all in one
/// transaction that holds the write lock from its first statement.
///
/// Use this instead of `load_combo` + `save_combo` whenever there is an
/// await between the two; writes committed meanwhile are then seen by
/// `change` rather than overwritten. Returns the saved combo, or `None`
/// when the album no longer exists.
pub async fn update_combo(
    pool: &SqlitePool,
    album_id: i64,
    change: impl FnOnce(&mut Combo),
) -> sqlx::Result<Option<Combo>> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query("UPDATE albums SET title = title WHERE id = ?")
        .bind(album_id)
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Ok(None);
    }

    let Some(mut combo) = read_combo(&mut tx, album_id).await? else {
        return Ok(None);
    };
    change(&mut combo);
    write_combo(&mut tx, &mut combo).await?;

    tx.commit().await?;
    Ok(Some(combo))
}

async fn write_combo(conn: &mut SqliteConnection, combo: &mut Combo) -> sqlx::Result<i64> {
    let album_id = upsert_album(&mut *conn, &mut combo.album).await?;
    replace_album_artist_credits(&mut *conn, album_id, &mut combo.artists).await?;
    replace_album_tracks(&mut *conn, album_id, &mut combo.tracks).await?;
    replace_album_tags(&mut *conn, album_id, &combo.tags).await?;
    Ok(album_id)
}

/// Load an album with its credits, tracks and tags.
pub async fn load_combo(pool: &SqlitePool, album_id: i64) -> sqlx::Result<Option<Combo>> {
    let mut conn = pool.acquire().await?;
    read_combo(&mut conn, album_id).await
}

async fn read_combo(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<Option<Combo>> {
    let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?");
    let Some(row): Option<AlbumRow> = sqlx::query_as(&sql)
        .bind(album_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let artists = load_credits(&mut *conn, CreditOwner::Album(album_id)).await?;

    let sql = format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? \
         ORDER BY COALESCE(disc_number, 1), album_position, id"
    );
    let rows: Vec<TrackRow> = sqlx::query_as(&sql)
        .bind(album_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut tracks = Vec::with_capacity(rows.len());
    for row in rows {
        let track = Track::from(row);
        let artists = match track.id {
            Some(id) => load_credits(&mut *conn, CreditOwner::Track(id)).await?,
            None => ArtistCredits::new(),
        };
        tracks.push(TrackCombo { track, artists });
    }

    let tags: Vec<(String,)> = sqlx::query_as(
        "SELECT t.name FROM album_tags at JOIN tags t ON t.id = at.tag_id \
         WHERE at.album_id = ? ORDER BY t.name",
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Combo {
        album: Album::from(row),
        artists,
        tracks,
        tags: tags.into_iter().map(|(name,)| name).collect(),
    }))
}

/// Insert a new album or update every column of an existing one.
///
/// Assigns `album.id` on insert.
pub async fn upsert_album(conn: &mut SqliteConnection, album: &mut Album) -> sqlx::Result<i64> {
    let playlist_id = album.playlist.as_ref().map(|p| p.id.as_str());
    let browse_id = album.playlist.as_ref().and_then(|p| p.browse_id.as_deref());

    if let Some(id) = album.id {
        sqlx::query(
            r#"
            UPDATE albums SET
                title = ?, in_library = ?, is_local = ?,
                musicbrainz_release_id = ?, musicbrainz_release_group_id = ?,
                playlist_id = ?, playlist_browse_id = ?,
                artwork_uri = ?, local_artwork_uri = ?, year = ?,
                is_deleted = ?, is_hidden = ?, is_temp = ?
            WHERE id = ?
            "#,
        )
        .bind(&album.title)
        .bind(album.in_library)
        .bind(album.is_local)
        .bind(&album.musicbrainz_release_id)
        .bind(&album.musicbrainz_release_group_id)
        .bind(playlist_id)
        .bind(browse_id)
        .bind(&album.artwork_uri)
        .bind(&album.local_artwork_uri)
        .bind(album.year)
        .bind(album.is_deleted)
        .bind(album.is_hidden)
        .bind(album.is_temp)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(id);
    }

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO albums (
            title, in_library, is_local,
            musicbrainz_release_id, musicbrainz_release_group_id,
            playlist_id, playlist_browse_id,
            artwork_uri, local_artwork_uri, year,
            is_deleted, is_hidden, is_temp, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&album.title)
    .bind(album.in_library)
    .bind(album.is_local)
    .bind(&album.musicbrainz_release_id)
    .bind(&album.musicbrainz_release_group_id)
    .bind(playlist_id)
    .bind(browse_id)
    .bind(&album.artwork_uri)
    .bind(&album.local_artwork_uri)
    .bind(album.year)
    .bind(album.is_deleted)
    .bind(album.is_hidden)
    .bind(album.is_temp)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    album.id = Some(row.0);
    Ok(row.0)
}

/// Replace the tracklist of an album.
///
/// Tracks carrying an id are updated in place (keeping playlist links
/// valid), new tracks are inserted, and album tracks missing from
/// `tracks` are deleted together with their credits.
pub async fn replace_album_tracks(
    conn: &mut SqliteConnection,
    album_id: i64,
    tracks: &mut [TrackCombo],
) -> sqlx::Result<()> {
    let mut kept = HashSet::with_capacity(tracks.len());

    for entry in tracks.iter_mut() {
        entry.track.album_id = Some(album_id);
        let track_id = upsert_track(conn, &mut entry.track).await?;
        kept.insert(track_id);
        replace_track_artist_credits(conn, track_id, &mut entry.artists).await?;
    }

    let existing: Vec<(i64,)> = sqlx::query_as("SELECT id FROM tracks WHERE album_id = ?")
        .bind(album_id)
        .fetch_all(&mut *conn)
        .await?;

    for (stale,) in existing.into_iter().filter(|(id,)| !kept.contains(id)) {
        sqlx::query("DELETE FROM track_artist_credits WHERE track_id = ?")
            .bind(stale)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(stale)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn upsert_track(conn: &mut SqliteConnection, track: &mut Track) -> sqlx::Result<i64> {
    let stream_id = track.stream.as_ref().map(|s| s.id.as_str());
    let stream_url = track.stream.as_ref().and_then(|s| s.url.as_deref());
    let stream_thumbnail = track.stream.as_ref().and_then(|s| s.thumbnail.as_deref());
    let duration_ms = track.duration_ms.map(|d| d as i64);

    if let Some(id) = track.id {
        sqlx::query(
            r#"
            UPDATE tracks SET
                title = ?, in_library = ?, album_id = ?, album_position = ?,
                disc_number = ?, year = ?, local_uri = ?,
                stream_id = ?, stream_url = ?, stream_thumbnail = ?,
                musicbrainz_id = ?, scrobble_id = ?, duration_ms = ?,
                play_count = ?, is_temp = ?
            WHERE id = ?
            "#,
        )
        .bind(&track.title)
        .bind(track.in_library)
        .bind(track.album_id)
        .bind(track.album_position)
        .bind(track.disc_number)
        .bind(track.year)
        .bind(&track.local_uri)
        .bind(stream_id)
        .bind(stream_url)
        .bind(stream_thumbnail)
        .bind(&track.musicbrainz_id)
        .bind(&track.scrobble_id)
        .bind(duration_ms)
        .bind(track.play_count)
        .bind(track.is_temp)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(id);
    }

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tracks (
            title, in_library, album_id, album_position, disc_number, year,
            local_uri, stream_id, stream_url, stream_thumbnail,
            musicbrainz_id, scrobble_id, duration_ms, play_count, is_temp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&track.title)
    .bind(track.in_library)
    .bind(track.album_id)
    .bind(track.album_position)
    .bind(track.disc_number)
    .bind(track.year)
    .bind(&track.local_uri)
    .bind(stream_id)
    .bind(stream_url)
    .bind(stream_thumbnail)
    .bind(&track.musicbrainz_id)
    .bind(&track.scrobble_id)
    .bind(duration_ms)
    .bind(track.play_count)
    .bind(track.is_temp)
    .fetch_one(&mut *conn)
    .await?;

    track.id = Some(row.0);
    Ok(row.0)
}

/// Replace the ordered artist credits of an album.
pub async fn replace_album_artist_credits(
    conn: &mut SqliteConnection,
    album_id: i64,
    credits: &mut ArtistCredits,
) -> sqlx::Result<()> {
    replace_credits(conn, CreditOwner::Album(album_id), credits).await
}

/// Replace the ordered artist credits of a track.
pub async fn replace_track_artist_credits(
    conn: &mut SqliteConnection,
    track_id: i64,
    credits: &mut ArtistCredits,
) -> sqlx::Result<()> {
    replace_credits(conn, CreditOwner::Track(track_id), credits).await
}

#[derive(Debug, Clone, Copy)]
enum CreditOwner {
    Album(i64),
    Track(i64),
}

impl CreditOwner {
    fn table_and_column(self) -> (&'static str, &'static str, i64) {
        match self {
            Self::Album(id) => ("album_artist_credits", "album_id", id),
            Self::Track(id) => ("track_artist_credits", "track_id", id),
        }
    }
}

async fn replace_credits(
    conn: &mut SqliteConnection,
    owner: CreditOwner,
    credits: &mut ArtistCredits,
) -> sqlx::Result<()> {
    let (table, column, owner_id) = owner.table_and_column();

    sqlx::query(&format!("DELETE FROM {table} WHERE {column} = ?"))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT INTO {table} ({column}, artist_id, position, join_phrase) VALUES (?, ?, ?, ?)"
    );
    for (position, credit) in credits.iter_mut().enumerate() {
        let artist_id = get_or_create_artist(conn, credit).await?;
        credit.artist_id = Some(artist_id);

        sqlx::query(&insert)
            .bind(owner_id)
            .bind(artist_id)
            .bind(position as i64)
            .bind(&credit.join_phrase)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn load_credits(
    conn: &mut SqliteConnection,
    owner: CreditOwner,
) -> sqlx::Result<ArtistCredits> {
    let (table, column, owner_id) = owner.table_and_column();
    let sql = format!(
        "SELECT c.artist_id, a.name, a.musicbrainz_id, c.join_phrase \
         FROM {table} c JOIN artists a ON a.id = c.artist_id \
         WHERE c.{column} = ? ORDER BY c.position"
    );
    let rows: Vec<(i64, String, Option<String>, String)> = sqlx::query_as(&sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(artist_id, name, musicbrainz_id, join_phrase)| ArtistCredit {
            artist_id: Some(artist_id),
            name,
            musicbrainz_id,
            join_phrase,
        })
        .collect())
}

/// Get or create an artist by name.
///
/// Idempotent: the same name always maps to the same id. A MusicBrainz id
/// learned later is filled in but never cleared.
async fn get_or_create_artist(
    conn: &mut SqliteConnection,
    credit: &ArtistCredit,
) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM artists WHERE name = ?")
        .bind(&credit.name)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some((id,)) = row {
        if credit.musicbrainz_id.is_some() {
            sqlx::query(
                "UPDATE artists SET musicbrainz_id = ? WHERE id = ? AND musicbrainz_id IS NULL",
            )
            .bind(&credit.musicbrainz_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO artists (name, musicbrainz_id) VALUES (?, ?)")
        .bind(&credit.name)
        .bind(&credit.musicbrainz_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

async fn replace_album_tags(
    conn: &mut SqliteConnection,
    album_id: i64,
    tags: &[String],
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM album_tags WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;

    for name in tags {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO album_tags (album_id, tag_id) \
             SELECT ?, id FROM tags WHERE name = ?",
        )
        .bind(album_id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
