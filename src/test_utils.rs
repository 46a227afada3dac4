//! Test utilities and fixtures for music-steward tests.
//!
//! This module provides common test helpers, fixture factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use music_steward::test_utils::{temp_db, mock_combo};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let mut combo = mock_combo("Album", "Artist", 10);
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use std::time::Duration;

use crate::model::{Album, ArtistCredit, ArtistCredits, Combo, Track, TrackCombo};
use crate::sources::{Release, ReleaseTrack, RemotePlaylist, RemoteTrack};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically. Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Duration of the fixture track at `position`: 3 minutes plus `position` seconds.
pub fn mock_duration_ms(position: u32) -> u64 {
    180_000 + u64::from(position) * 1_000
}

/// Creates an unsaved combo with `tracks` numbered tracks credited to `artist`.
pub fn mock_combo(title: &str, artist: &str, tracks: u32) -> Combo {
    let mut combo = Combo::new(Album::new(title));
    combo.artists.push(ArtistCredit::named(artist));
    combo.tracks = (1..=tracks)
        .map(|n| {
            let track = Track {
                album_position: Some(n),
                disc_number: Some(1),
                duration_ms: Some(mock_duration_ms(n)),
                ..Track::new(format!("Track {}", n))
            };
            let mut entry = TrackCombo::new(track);
            entry.artists.push(ArtistCredit::named(artist));
            entry
        })
        .collect();
    combo
}

/// Creates a streaming playlist whose tracklist mirrors [`mock_combo`].
pub fn mock_playlist(id: &str, title: &str, artist: &str, tracks: u32) -> RemotePlaylist {
    RemotePlaylist {
        id: id.to_string(),
        browse_id: Some(format!("browse-{}", id)),
        title: title.to_string(),
        artist: artist.to_string(),
        thumbnail: None,
        tracks: (1..=tracks)
            .map(|n| RemoteTrack {
                id: format!("{}-vid-{}", id, n),
                title: format!("Track {}", n),
                duration_ms: Some(mock_duration_ms(n)),
                url: Some(format!("https://media.example.com/{}/{}", id, n)),
                thumbnail: None,
            })
            .collect(),
    }
}

/// Creates a metadata release credited to "Band" whose durations mirror [`mock_combo`].
pub fn mock_release(id: &str, title: &str, tracks: u32) -> Release {
    let mut artists = ArtistCredits::new();
    artists.push(ArtistCredit {
        musicbrainz_id: Some("band-id".to_string()),
        ..ArtistCredit::named("Band")
    });
    Release {
        id: id.to_string(),
        release_group_id: Some(format!("rg-{}", id)),
        title: title.to_string(),
        artists,
        year: Some(2004),
        tracks: (1..=tracks)
            .map(|n| ReleaseTrack {
                recording_id: Some(format!("rec-{}", n)),
                title: format!("Track {}", n),
                position: Some(n),
                disc_number: Some(1),
                duration_ms: Some(mock_duration_ms(n)),
                artists: ArtistCredits::new(),
            })
            .collect(),
        genres: vec!["rock".to_string()],
    }
}

/// Polls `condition` until it holds, panicking after about five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Inserts a track without an album and returns its ID.
pub async fn insert_loose_track(pool: &SqlitePool, track: &Track) -> i64 {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO tracks (title, local_uri, stream_id, is_temp) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&track.title)
    .bind(&track.local_uri)
    .bind(track.stream_id())
    .bind(track.is_temp)
    .fetch_one(pool)
    .await
    .expect("Failed to insert loose track");
    row.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        let albums = crate::db::list_album_summaries(&pool).await.unwrap();
        assert!(albums.is_empty());
    }

    #[test]
    fn test_mock_combo_defaults() {
        let combo = mock_combo("Album", "Artist", 3);
        assert_eq!(combo.tracks.len(), 3);
        assert_eq!(combo.artist_string(), "Artist");
        assert_eq!(combo.tracks[2].track.album_position, Some(3));
        assert_eq!(combo.tracks[0].track.duration_ms, Some(181_000));
    }

    #[test]
    fn test_mock_playlist_mirrors_combo() {
        let combo = mock_combo("Album", "Artist", 4);
        let playlist = mock_playlist("PL1", "Album", "Artist", 4);
        let durations: Vec<_> = playlist.tracks.iter().map(|t| t.duration_ms).collect();
        assert_eq!(durations, combo.durations_ms());
    }
}
