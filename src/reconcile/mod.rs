//! Startup reconciliation ("library GC").
//!
//! A best-effort maintenance pass over the catalog, run once at startup and
//! on demand. Each step is idempotent and runs even when an earlier one
//! failed; failures end up in the [`GcReport`] and in the log, never in the
//! caller's control flow.
//!
//! 1. Add newly discovered genres to the tag vocabulary
//! 2. Queue uncatalogued local albums for import (when auto-import is on)
//! 3. Repair local file state in one transaction
//! 4. Drop orphan playlist links
//! 5. Drop temp rows left by interrupted operations
//! 6. Purge soft-deleted albums, files first
//!
//! # Usage
//!
//! ```ignore
//! let gc = LibraryGc::new(pool.clone(), sources.clone())
//!     .with_auto_import(queue.clone(), music_dir);
//! let handle = gc.spawn();
//! ```

mod report;

pub use report::GcReport;

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use rayon::prelude::*;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::LibraryConfig;
use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::import::{ImportQueue, ImportRequest, ImportSource};
use crate::model::Album;
use crate::sources::Sources;

/// Local albums are imported through the queue so it stays the only
/// creator of albums.
struct AutoImport {
    queue: ImportQueue,
    music_dir: PathBuf,
}

pub struct LibraryGc {
    pool: SqlitePool,
    sources: Sources,
    auto_import: Option<AutoImport>,
}

impl LibraryGc {
    pub fn new(pool: SqlitePool, sources: Sources) -> Self {
        Self {
            pool,
            sources,
            auto_import: None,
        }
    }

    /// Scan `music_dir` for uncatalogued albums and enqueue them.
    pub fn with_auto_import(mut self, queue: ImportQueue, music_dir: PathBuf) -> Self {
        self.auto_import = Some(AutoImport { queue, music_dir });
        self
    }

    /// Build from the library settings; auto-import only when enabled and a
    /// music directory is configured.
    pub fn from_config(
        pool: SqlitePool,
        sources: Sources,
        queue: &ImportQueue,
        library: &LibraryConfig,
    ) -> Self {
        let gc = Self::new(pool, sources);
        match &library.music_dir {
            Some(dir) if library.auto_import => gc.with_auto_import(queue.clone(), dir.clone()),
            _ => gc,
        }
    }

    /// Run every step once. Never fails; see [`GcReport::failures`].
    pub async fn run(&self) -> GcReport {
        tracing::info!(target: "reconcile", "Library reconciliation started");
        let mut report = GcReport::default();

        match self.sync_genres().await {
            Ok(added) => report.genres_added = added,
            Err(e) => report.record("sync_genres", e),
        }
        if let Err(e) = self.queue_local_imports(&mut report).await {
            report.record("auto_import", e);
        }
        if let Err(e) = self.repair_local_state(&mut report).await {
            report.record("repair_local_state", e);
        }
        match db::delete_orphan_playlist_tracks(&self.pool).await {
            Ok(removed) => report.playlist_links_removed = removed,
            Err(e) => report.record("orphan_playlist_links", e),
        }
        match db::delete_temp_rows(&self.pool).await {
            Ok((tracks, albums)) => {
                report.temp_tracks_removed = tracks;
                report.temp_albums_removed = albums;
            }
            Err(e) => report.record("temp_rows", e),
        }
        if let Err(e) = self.purge_deleted(&mut report).await {
            report.record("purge_deleted", e);
        }

        tracing::info!(
            target: "reconcile",
            genres = report.genres_added,
            imports = report.imports_queued,
            cleared = report.local.cleared_references,
            purged = report.albums_purged,
            failures = report.failures.len(),
            "Library reconciliation finished"
        );
        report
    }

    /// Run as a detached task so startup never waits on it.
    pub fn spawn(self) -> JoinHandle<GcReport> {
        tokio::spawn(async move { self.run().await })
    }

    /// Additive diff of the controlled genre vocabulary against known tags.
    ///
    /// Returns how many names were added.
    pub async fn sync_genres(&self) -> Result<u64> {
        let Ok(metadata) = self.sources.metadata() else {
            tracing::debug!(target: "reconcile", "No metadata backend, skipping genres");
            return Ok(0);
        };

        let genres = metadata.list_genres().await?;
        let known: HashSet<String> = db::list_tags(&self.pool)
            .await?
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let mut seen = HashSet::new();
        let new: Vec<String> = genres
            .into_iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty() && !known.contains(g) && seen.insert(g.clone()))
            .collect();

        if new.is_empty() {
            return Ok(0);
        }
        let added = db::insert_tags(&self.pool, &new).await?;
        tracing::debug!(target: "reconcile", added, "Genre vocabulary extended");
        Ok(added)
    }

    async fn queue_local_imports(&self, report: &mut GcReport) -> Result<()> {
        let Some(auto) = &self.auto_import else {
            return Ok(());
        };
        let local = self.sources.local()?;

        let known: HashSet<String> = db::list_local_uris(&self.pool).await?.into_iter().collect();
        let mut albums = local.scan(auto.music_dir.clone(), known);

        while let Some(album) = albums.next().await {
            tracing::debug!(target: "reconcile", dir = %album.directory.display(), "Queueing local album");
            auto.queue
                .enqueue(ImportRequest::new(ImportSource::Local(album)));
            report.imports_queued += 1;
        }
        Ok(())
    }

    /// Clear unreadable file references, drop duplicate loose tracks and
    /// unflag albums without local audio, all in one transaction.
    async fn repair_local_state(&self, report: &mut GcReport) -> Result<()> {
        let tracks = db::list_tracks_with_local_uri(&self.pool).await?;

        let broken: Vec<(i64, String)> = tokio::task::spawn_blocking(move || {
            tracks
                .into_par_iter()
                .filter(|(_, uri)| !is_readable_file(Path::new(uri)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| Error::reconciliation("repair_local_state", e.to_string()))?;

        if !broken.is_empty() {
            tracing::info!(target: "reconcile", count = broken.len(), "Clearing unreadable file references");
        }
        report.local = db::repair_local_state(&self.pool, &broken).await?;
        Ok(())
    }

    /// Delete files, then rows, of every soft-deleted album.
    ///
    /// An album whose files cannot be removed keeps its rows and is retried
    /// on the next pass.
    async fn purge_deleted(&self, report: &mut GcReport) -> Result<()> {
        for album in db::list_soft_deleted_albums(&self.pool).await? {
            let Some(album_id) = album.id else { continue };

            let removed = match self.remove_album_files(&album).await {
                Ok(removed) => removed,
                Err(e) => {
                    report.record("purge_deleted", format!("album {}: {}", album_id, e));
                    continue;
                }
            };

            let tracks = match db::delete_album_rows(&self.pool, album_id).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    report.record("purge_deleted", format!("album {}: {}", album_id, e));
                    continue;
                }
            };
            tracing::info!(target: "reconcile", album_id, tracks, files = removed, "Purged deleted album");
            report.albums_purged += 1;
            report.files_removed += removed;
        }
        Ok(())
    }

    async fn remove_album_files(&self, album: &Album) -> Result<usize> {
        let Some(album_id) = album.id else {
            return Ok(0);
        };

        let mut files: Vec<PathBuf> = db::get_album_tracks(&self.pool, album_id)
            .await?
            .into_iter()
            .filter_map(|t| t.local_uri.map(PathBuf::from))
            .collect();
        files.extend(album.local_artwork_uri.as_ref().map(PathBuf::from));

        let mut removed = 0;
        let mut dirs = HashSet::new();
        for file in files {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(format!("removing {}", file.display())),
            }
            if let Some(dir) = file.parent() {
                dirs.insert(dir.to_path_buf());
            }
        }

        // Only succeeds on directories left empty
        for dir in dirs {
            let _ = tokio::fs::remove_dir(&dir).await;
        }
        Ok(removed)
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::import::{ImportBatch, ImportPipeline};
    use crate::model::{StreamSource, Track};
    use crate::sources::traits::mocks::MockMetadata;
    use crate::sources::{LocalAlbum, LocalLibrary, LocalTrack, SourceError};
    use crate::test_utils::{insert_loose_track, mock_combo, temp_db};
    use futures::stream::BoxStream;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Local backend yielding fixed albums and recording the known URIs it got.
    #[derive(Default)]
    struct StaticLibrary {
        albums: Vec<LocalAlbum>,
        known: Mutex<HashSet<String>>,
    }

    impl LocalLibrary for StaticLibrary {
        fn scan(&self, _root: PathBuf, known_uris: HashSet<String>) -> BoxStream<'static, LocalAlbum> {
            let albums: Vec<LocalAlbum> = self
                .albums
                .iter()
                .filter(|a| {
                    a.tracks
                        .iter()
                        .any(|t| !known_uris.contains(&*t.path.to_string_lossy()))
                })
                .cloned()
                .collect();
            *self.known.lock() = known_uris;
            futures::stream::iter(albums).boxed()
        }
    }

    fn touch(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, b"audio").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_genres_are_added_not_replaced() {
        let (pool, _dir) = temp_db().await;
        db::insert_tags(&pool, &["rock".to_string(), "favourites".to_string()])
            .await
            .unwrap();
        let sources = Sources {
            metadata: Some(Arc::new(MockMetadata::with_genres(&["Rock", "jazz", "ambient", "jazz"]))),
            ..Default::default()
        };
        let gc = LibraryGc::new(pool.clone(), sources);

        let report = gc.run().await;
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.genres_added, 2);
        assert_eq!(
            db::list_tags(&pool).await.unwrap(),
            vec!["ambient", "favourites", "jazz", "rock"]
        );

        assert_eq!(gc.run().await.genres_added, 0);
    }

    #[tokio::test]
    async fn test_missing_file_clears_reference_but_keeps_album_local() {
        let (pool, _dir) = temp_db().await;
        let files = tempfile::tempdir().unwrap();

        let mut combo = mock_combo("Album", "Band", 2);
        combo.album.is_local = true;
        combo.tracks[0].track.local_uri = Some(touch(files.path(), "01.flac"));
        combo.tracks[1].track.local_uri = Some(files.path().join("02.flac").to_string_lossy().into());
        let album_id = db::save_combo(&pool, &mut combo).await.unwrap();

        let report = LibraryGc::new(pool.clone(), Sources::default()).run().await;
        assert_eq!(report.local.cleared_references, 1);
        assert_eq!(report.local.albums_unflagged, 0);

        let tracks = db::get_album_tracks(&pool, album_id).await.unwrap();
        assert!(tracks[0].is_downloaded());
        assert!(!tracks[1].is_downloaded());
        assert!(db::get_album(&pool, album_id).await.unwrap().unwrap().is_local);

        std::fs::remove_file(files.path().join("01.flac")).unwrap();
        let report = LibraryGc::new(pool.clone(), Sources::default()).run().await;
        assert_eq!(report.local.cleared_references, 1);
        assert_eq!(report.local.albums_unflagged, 1);
        assert!(!db::get_album(&pool, album_id).await.unwrap().unwrap().is_local);
    }

    #[tokio::test]
    async fn test_loose_duplicate_of_album_track_is_removed() {
        let (pool, _dir) = temp_db().await;
        let files = tempfile::tempdir().unwrap();
        let uri = touch(files.path(), "01.opus");

        let mut combo = mock_combo("Album", "Band", 1);
        combo.tracks[0].track.local_uri = Some(uri.clone());
        combo.tracks[0].track.stream = Some(StreamSource::new("vid-1"));
        db::save_combo(&pool, &mut combo).await.unwrap();

        let loose = Track {
            local_uri: Some(uri),
            stream: Some(StreamSource::new("vid-1")),
            ..Track::new("Track 1")
        };
        let loose_id = insert_loose_track(&pool, &loose).await;
        let other = insert_loose_track(
            &pool,
            &Track {
                stream: Some(StreamSource::new("vid-other")),
                ..Track::new("Single")
            },
        )
        .await;

        let report = LibraryGc::new(pool.clone(), Sources::default()).run().await;
        assert_eq!(report.local.duplicates_removed, 1);
        assert!(db::get_track(&pool, loose_id).await.unwrap().is_none());
        assert!(db::get_track(&pool, other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_temp_rows_and_deleted_albums_are_purged() {
        let (pool, _dir) = temp_db().await;
        let files = tempfile::tempdir().unwrap();
        let album_dir = files.path().join("Band - Gone");
        std::fs::create_dir(&album_dir).unwrap();

        let mut gone = mock_combo("Gone", "Band", 1);
        gone.tracks[0].track.local_uri = Some(touch(&album_dir, "01 - Track 1.opus"));
        gone.album.local_artwork_uri = Some(touch(&album_dir, "cover.jpg"));
        let gone_id = db::save_combo(&pool, &mut gone).await.unwrap();
        db::soft_delete_album(&pool, gone_id).await.unwrap();

        let mut temp = mock_combo("Half Written", "Band", 2);
        temp.album.is_temp = true;
        let temp_id = db::save_combo(&pool, &mut temp).await.unwrap();

        let mut kept = mock_combo("Kept", "Band", 1);
        let kept_id = db::save_combo(&pool, &mut kept).await.unwrap();

        let report = LibraryGc::new(pool.clone(), Sources::default()).run().await;
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.albums_purged, 1);
        assert_eq!(report.files_removed, 2);
        assert_eq!(report.temp_albums_removed, 1);
        assert_eq!(report.temp_tracks_removed, 2);

        assert!(db::get_album(&pool, gone_id).await.unwrap().is_none());
        assert!(db::get_album(&pool, temp_id).await.unwrap().is_none());
        assert!(db::get_album(&pool, kept_id).await.unwrap().is_some());
        assert!(!album_dir.exists());
    }

    #[tokio::test]
    async fn test_album_rows_that_cannot_be_deleted_do_not_stop_the_purge() {
        let (pool, _dir) = temp_db().await;
        let mut stuck = mock_combo("Stuck", "Band", 1);
        let stuck_id = db::save_combo(&pool, &mut stuck).await.unwrap();
        db::soft_delete_album(&pool, stuck_id).await.unwrap();
        let mut gone = mock_combo("Gone", "Band", 1);
        let gone_id = db::save_combo(&pool, &mut gone).await.unwrap();
        db::soft_delete_album(&pool, gone_id).await.unwrap();

        sqlx::query(&format!(
            "CREATE TRIGGER keep_stuck BEFORE DELETE ON albums WHEN OLD.id = {stuck_id} \
             BEGIN SELECT RAISE(ABORT, 'album is pinned'); END"
        ))
        .execute(&pool)
        .await
        .unwrap();

        let report = LibraryGc::new(pool.clone(), Sources::default()).run().await;

        assert_eq!(report.failed_steps(), vec!["purge_deleted"]);
        assert_eq!(report.albums_purged, 1);
        assert!(db::get_album(&pool, gone_id).await.unwrap().is_none());
        let stuck = db::get_album(&pool, stuck_id).await.unwrap().unwrap();
        assert!(stuck.is_deleted);
        assert_eq!(db::get_album_tracks(&pool, stuck_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_step_does_not_stop_the_pass() {
        let (pool, _dir) = temp_db().await;
        let mut temp = mock_combo("Half Written", "Band", 1);
        temp.album.is_temp = true;
        db::save_combo(&pool, &mut temp).await.unwrap();

        let sources = Sources {
            metadata: Some(Arc::new(MockMetadata::with_error(SourceError::RateLimited))),
            ..Default::default()
        };
        let report = LibraryGc::new(pool.clone(), sources).spawn().await.unwrap();

        assert_eq!(report.failed_steps(), vec!["sync_genres"]);
        assert_eq!(report.temp_albums_removed, 1);
    }

    #[tokio::test]
    async fn test_auto_import_queues_unknown_local_albums() {
        let (pool, _dir) = temp_db().await;
        let files = tempfile::tempdir().unwrap();

        let mut known = mock_combo("Known", "Band", 1);
        let known_uri = touch(files.path(), "known.flac");
        known.tracks[0].track.local_uri = Some(known_uri.clone());
        db::save_combo(&pool, &mut known).await.unwrap();

        let local_album = |title: &str, file: &str| LocalAlbum {
            title: title.to_string(),
            artist: "Band".to_string(),
            directory: files.path().to_path_buf(),
            tracks: vec![LocalTrack {
                path: PathBuf::from(file),
                title: "Track 1".to_string(),
                artist: "Band".to_string(),
                position: Some(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let library = Arc::new(StaticLibrary {
            albums: vec![
                local_album("Known", &known_uri),
                local_album("Fresh", &touch(files.path(), "fresh.flac")),
            ],
            ..Default::default()
        });
        let sources = Sources {
            local: Some(library.clone()),
            ..Default::default()
        };

        let pipeline = ImportPipeline::new(pool.clone(), sources.clone(), &MatchingConfig::default());
        let queue = ImportQueue::start(pipeline, None);
        let (tx, mut rx) = mpsc::unbounded_channel::<ImportBatch>();
        queue.on_batch_finished(move |batch| {
            let _ = tx.send(batch.clone());
        });

        let report = LibraryGc::new(pool.clone(), sources)
            .with_auto_import(queue.clone(), files.path().to_path_buf())
            .run()
            .await;
        assert_eq!(report.imports_queued, 1);
        assert!(library.known.lock().contains(&known_uri));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.successes().count(), 1);
        let titles: Vec<String> = db::list_album_summaries(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.album.title)
            .collect();
        assert_eq!(titles, vec!["Fresh", "Known"]);
    }
}
