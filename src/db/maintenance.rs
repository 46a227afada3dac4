//! Catalog maintenance queries used by startup reconciliation.

use sqlx::sqlite::SqlitePool;

/// Counts from the local-state repair transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalRepair {
    /// Tracks whose local file reference was cleared
    pub cleared_references: u64,
    /// Loose tracks deleted as duplicates of album tracks
    pub duplicates_removed: u64,
    /// Albums no longer flagged as local
    pub albums_unflagged: u64,
}

/// `(track_id, local_uri)` for every track that references a local file.
pub async fn list_tracks_with_local_uri(pool: &SqlitePool) -> sqlx::Result<Vec<(i64, String)>> {
    sqlx::query_as("SELECT id, local_uri FROM tracks WHERE local_uri IS NOT NULL ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Repair local-file state in a single transaction.
///
/// 1. Clear the local reference of every `(track_id, local_uri)` in
///    `broken`, unless the track points at a different file by now.
/// 2. Delete tracks without an album that duplicate an album track by
///    identical `(local_uri, stream_id)`.
/// 3. Unflag `is_local` on albums none of whose tracks are local anymore.
pub async fn repair_local_state(
    pool: &SqlitePool,
    broken: &[(i64, String)],
) -> sqlx::Result<LocalRepair> {
    let mut tx = pool.begin().await?;
    let mut repair = LocalRepair::default();

    for (id, uri) in broken {
        let result = sqlx::query("UPDATE tracks SET local_uri = NULL WHERE id = ? AND local_uri = ?")
            .bind(id)
            .bind(uri)
            .execute(&mut *tx)
            .await?;
        repair.cleared_references += result.rows_affected();
    }

    let duplicates = sqlx::query(
        r#"
        DELETE FROM tracks
        WHERE album_id IS NULL
          AND (local_uri IS NOT NULL OR stream_id IS NOT NULL)
          AND EXISTS (
              SELECT 1 FROM tracks other
              WHERE other.album_id IS NOT NULL
                AND other.id != tracks.id
                AND other.local_uri IS tracks.local_uri
                AND other.stream_id IS tracks.stream_id
          )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    repair.duplicates_removed = duplicates.rows_affected();

    sqlx::query("DELETE FROM track_artist_credits WHERE track_id NOT IN (SELECT id FROM tracks)")
        .execute(&mut *tx)
        .await?;

    let unflagged = sqlx::query(
        r#"
        UPDATE albums SET is_local = 0
        WHERE is_local = 1
          AND NOT EXISTS (
              SELECT 1 FROM tracks
              WHERE tracks.album_id = albums.id AND tracks.local_uri IS NOT NULL
          )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    repair.albums_unflagged = unflagged.rows_affected();

    tx.commit().await?;
    Ok(repair)
}

/// Delete playlist links whose track or playlist no longer exists.
pub async fn delete_orphan_playlist_tracks(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM playlist_tracks
        WHERE track_id NOT IN (SELECT id FROM tracks)
           OR playlist_id NOT IN (SELECT id FROM playlists)
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete temp tracks and temp albums left by interrupted operations.
///
/// Returns `(tracks_deleted, albums_deleted)`. Tracks belonging to a temp
/// album go with it.
pub async fn delete_temp_rows(pool: &SqlitePool) -> sqlx::Result<(u64, u64)> {
    let mut tx = pool.begin().await?;

    let tracks = sqlx::query(
        "DELETE FROM tracks WHERE is_temp = 1 \
         OR album_id IN (SELECT id FROM albums WHERE is_temp = 1)",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM track_artist_credits WHERE track_id NOT IN (SELECT id FROM tracks)")
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "DELETE FROM album_artist_credits WHERE album_id IN (SELECT id FROM albums WHERE is_temp = 1)",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM album_tags WHERE album_id IN (SELECT id FROM albums WHERE is_temp = 1)")
        .execute(&mut *tx)
        .await?;

    let albums = sqlx::query("DELETE FROM albums WHERE is_temp = 1")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((tracks.rows_affected(), albums.rows_affected()))
}

/// Delete an album row with its tracks, credits and tags in one transaction.
///
/// Returns the number of tracks removed.
pub async fn delete_album_rows(pool: &SqlitePool, album_id: i64) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM track_artist_credits WHERE track_id IN (SELECT id FROM tracks WHERE album_id = ?)",
    )
    .bind(album_id)
    .execute(&mut *tx)
    .await?;

    let tracks = sqlx::query("DELETE FROM tracks WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *tx)
        .await?;

    for table in ["album_artist_credits", "album_tags"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE album_id = ?"))
            .bind(album_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(album_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(tracks.rows_affected())
}
