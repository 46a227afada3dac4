//! The per-job import pipeline: convert, match, identity check, persist.

use std::sync::Arc;

use sqlx::SqlitePool;

use super::ImportError;
use super::job::{ImportRequest, ImportSource};
use crate::config::MatchingConfig;
use crate::db;
use crate::matching::{MatchScorer, MergeStrategy, best_match, merge_combo, resolve_local_identity};
use crate::model::Combo;
use crate::sources::Sources;
use crate::sources::convert::{
    attach_playlist, combo_from_local, combo_from_playlist, combo_from_release, combo_from_scrobble,
};

/// Fraction of a job reached after each step.
const CONVERTED: f32 = 0.25;
const MATCHED: f32 = 0.5;
const IDENTIFIED: f32 = 0.75;
const PERSISTED: f32 = 1.0;

pub struct ImportPipeline {
    pool: SqlitePool,
    sources: Sources,
    scorer: Arc<dyn MatchScorer>,
    min_confidence: f32,
    strategy: MergeStrategy,
}

impl ImportPipeline {
    pub fn new(pool: SqlitePool, sources: Sources, matching: &MatchingConfig) -> Self {
        Self {
            pool,
            sources,
            scorer: Arc::new(matching.scorer()),
            min_confidence: matching.min_confidence,
            strategy: matching.merge_strategy,
        }
    }

    /// Run one job to completion, reporting the job's own fraction.
    ///
    /// Returns the id of the persisted album.
    pub async fn run(
        &self,
        request: &ImportRequest,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<i64, ImportError> {
        let mut combo = self.convert(&request.source).await?;
        progress(CONVERTED);

        if request.match_playable && combo.album.playlist.is_none() {
            self.match_playable(&mut combo).await?;
        }
        progress(MATCHED);

        let existing = self.find_existing(&combo, &request.source).await?;
        progress(IDENTIFIED);

        let policy = self.strategy.policy();
        let reused = match existing {
            Some(album_id) => {
                tracing::debug!(target: "import", album_id, "Reusing existing album");
                db::update_combo(&self.pool, album_id, |stored| {
                    merge_combo(stored, &combo, policy);
                    mark_imported(stored);
                })
                .await?
                .map(|stored| (album_id, stored))
            }
            None => None,
        };
        let (album_id, combo) = match reused {
            Some(saved) => saved,
            None => {
                mark_imported(&mut combo);
                (db::save_combo(&self.pool, &mut combo).await?, combo)
            }
        };
        progress(PERSISTED);

        tracing::info!(target: "import", album_id, album = %combo.display_name(), "Album imported");
        Ok(album_id)
    }

    /// Source-specific descriptor to canonical combo.
    async fn convert(&self, source: &ImportSource) -> Result<Combo, ImportError> {
        let combo = match source {
            ImportSource::Streaming { playlist_id } => {
                let playlist = self.sources.streaming()?.fetch_playlist(playlist_id).await?;
                combo_from_playlist(&playlist)
            }
            ImportSource::Release { release_id } => {
                let release = self.sources.metadata()?.fetch_release(release_id).await?;
                combo_from_release(&release)
            }
            ImportSource::Scrobble { artist, title } => {
                let album = self.sources.scrobble()?.fetch_album(artist, title).await?;
                combo_from_scrobble(&album)
            }
            ImportSource::Local(album) => combo_from_local(album),
        };

        if combo.album.title.trim().is_empty() {
            return Err(ImportError::Conversion("album has no title".to_string()));
        }
        if combo.tracks.is_empty() {
            return Err(ImportError::Conversion(format!(
                "{} has no tracks",
                combo.display_name()
            )));
        }
        Ok(combo)
    }

    async fn match_playable(&self, combo: &mut Combo) -> Result<(), ImportError> {
        let streaming = self.sources.streaming().map_err(ImportError::Matching)?;
        let found = best_match(
            streaming.as_ref(),
            combo,
            self.scorer.as_ref(),
            self.min_confidence,
        )
        .await
        .map_err(ImportError::Matching)?;

        let Some((playlist, score)) = found else {
            return Err(ImportError::NoMatchFound);
        };
        tracing::debug!(target: "import", playlist = %playlist.id, score, "Playable match accepted");
        attach_playlist(combo, &playlist);
        Ok(())
    }

    /// Identity check: the stored album this import should merge into.
    ///
    /// Streaming playlist id first, release id second; local imports also
    /// fall back to `(title, artist)` identity.
    async fn find_existing(&self, combo: &Combo, source: &ImportSource) -> Result<Option<i64>, ImportError> {
        let mut existing = None;

        if let Some(playlist_id) = combo.album.playlist_id() {
            existing = db::find_album_by_playlist_id(&self.pool, playlist_id).await?;
        }
        if existing.is_none()
            && !matches!(source, ImportSource::Local(_))
            && let Some(release_id) = combo.album.musicbrainz_release_id.as_deref()
        {
            existing = db::find_album_by_release_id(&self.pool, release_id).await?;
        }
        if existing.is_none() && matches!(source, ImportSource::Local(_)) {
            let catalog = db::list_album_summaries(&self.pool).await?;
            existing = resolve_local_identity(combo, &catalog);
        }

        Ok(existing.and_then(|album| album.id))
    }
}

/// Imported albums are visible library members, local when any track is on disk.
fn mark_imported(combo: &mut Combo) {
    combo.album.in_library = true;
    combo.album.is_hidden = false;
    combo.album.is_deleted = false;
    combo.album.is_temp = false;
    combo.album.is_local = combo.tracks.iter().any(|t| t.track.is_downloaded());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::traits::mocks::MockMetadata;
    use crate::test_utils::{mock_combo, mock_release, temp_db};

    fn pipeline(pool: &SqlitePool, strategy: MergeStrategy) -> ImportPipeline {
        let sources = Sources {
            metadata: Some(Arc::new(MockMetadata::with_releases(vec![mock_release(
                "rel-1", "Album", 2,
            )]))),
            ..Default::default()
        };
        let matching = MatchingConfig {
            merge_strategy: strategy,
            ..Default::default()
        };
        ImportPipeline::new(pool.clone(), sources, &matching)
    }

    async fn stored_release(pool: &SqlitePool, tracks: u32) -> (i64, Combo) {
        let mut stored = mock_combo("Album", "Band", tracks);
        stored.album.musicbrainz_release_id = Some("rel-1".to_string());
        let album_id = db::save_combo(pool, &mut stored).await.unwrap();
        (album_id, stored)
    }

    fn release_request() -> ImportRequest {
        ImportRequest::new(ImportSource::Release {
            release_id: "rel-1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_configured_strategy_shapes_reimported_tracklist() {
        let (pool, _dir) = temp_db().await;
        let (album_id, stored) = stored_release(&pool, 3).await;

        let merged = pipeline(&pool, MergeStrategy::KeepLeast)
            .run(&release_request(), &|_| {})
            .await
            .unwrap();

        assert_eq!(merged, album_id);
        let tracks = db::get_album_tracks(&pool, album_id).await.unwrap();
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Track 1", "Track 2"]);
        assert_eq!(tracks[0].id, stored.tracks[0].track.id);
        assert_eq!(tracks[0].musicbrainz_id.as_deref(), Some("rec-1"));
    }

    #[tokio::test]
    async fn test_default_strategy_keeps_stored_tracks() {
        let (pool, _dir) = temp_db().await;
        let (album_id, _) = stored_release(&pool, 3).await;

        pipeline(&pool, MergeStrategy::KeepSelf)
            .run(&release_request(), &|_| {})
            .await
            .unwrap();

        assert_eq!(db::get_album_tracks(&pool, album_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reimport_keeps_downloaded_files() {
        let (pool, _dir) = temp_db().await;
        let (album_id, stored) = stored_release(&pool, 2).await;
        let track_id = stored.tracks[1].track.id.unwrap();
        db::mark_track_downloaded(&pool, track_id, "/downloads/02.opus")
            .await
            .unwrap();

        pipeline(&pool, MergeStrategy::KeepSelf)
            .run(&release_request(), &|_| {})
            .await
            .unwrap();

        let album = db::get_album(&pool, album_id).await.unwrap().unwrap();
        assert!(album.is_local);
        assert!(album.in_library);
        let track = db::get_track(&pool, track_id).await.unwrap().unwrap();
        assert_eq!(track.local_uri.as_deref(), Some("/downloads/02.opus"));
    }

    #[tokio::test]
    async fn test_new_release_is_saved_once() {
        let (pool, _dir) = temp_db().await;
        let seen = parking_lot::Mutex::new(Vec::new());

        let album_id = pipeline(&pool, MergeStrategy::KeepSelf)
            .run(&release_request(), &|f| seen.lock().push(f))
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![CONVERTED, MATCHED, IDENTIFIED, PERSISTED]);
        let album = db::get_album(&pool, album_id).await.unwrap().unwrap();
        assert!(album.in_library);
        assert!(!album.is_local);
        assert_eq!(db::list_album_summaries(&pool).await.unwrap().len(), 1);
    }
}
