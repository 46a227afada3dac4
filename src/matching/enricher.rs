//! Cross-source enrichment of catalog albums.
//!
//! Backfills a combo from the structured-metadata backend (release id,
//! recording ids, genres, artwork) and links a streaming playlist when one
//! matches. Backend failures are logged and skipped; enrichment only ever
//! adds information.

use std::sync::Arc;

use sqlx::SqlitePool;

use super::merge::{MergeStrategy, merge_combo};
use super::scorer::{MatchScorer, best_match};
use crate::config::MatchingConfig;
use crate::db;
use crate::error::{Error, Result};
use crate::model::Combo;
use crate::sources::convert::{attach_playlist, combo_from_release};
use crate::sources::{MetadataApi, Release, ReleaseSummary, SourceError, Sources};

/// Minimum MusicBrainz search score for a release to be considered
const MIN_RELEASE_SCORE: u32 = 90;

#[derive(Clone)]
pub struct Enricher {
    pool: SqlitePool,
    sources: Sources,
    scorer: Arc<dyn MatchScorer>,
    min_confidence: f32,
    strategy: MergeStrategy,
}

impl Enricher {
    pub fn new(pool: SqlitePool, sources: Sources, matching: &MatchingConfig) -> Self {
        Self {
            pool,
            sources,
            scorer: Arc::new(matching.scorer()),
            min_confidence: matching.min_confidence,
            strategy: matching.merge_strategy,
        }
    }

    /// Enrich a combo. `None` when nothing could be added.
    pub async fn enrich(&self, combo: &Combo) -> Option<Combo> {
        let mut enriched = combo.clone();

        if let Ok(metadata) = self.sources.metadata() {
            match self.find_release(metadata.as_ref(), &enriched).await {
                Ok(Some(release)) => {
                    tracing::debug!(target: "enrich", release = %release.id, "Merging release");
                    merge_combo(
                        &mut enriched,
                        &combo_from_release(&release),
                        self.strategy.policy(),
                    );
                    self.backfill_artwork(metadata.as_ref(), &mut enriched).await;
                }
                Ok(None) => {
                    tracing::debug!(target: "enrich", album = %combo.display_name(), "No confident release");
                }
                Err(e) => {
                    tracing::warn!(target: "enrich", album = %combo.display_name(), error = %e, "Release lookup failed");
                }
            }
        }

        if enriched.album.playlist.is_none()
            && let Ok(streaming) = self.sources.streaming()
        {
            match best_match(
                streaming.as_ref(),
                &enriched,
                self.scorer.as_ref(),
                self.min_confidence,
            )
            .await
            {
                Ok(Some((playlist, score))) => {
                    tracing::debug!(target: "enrich", playlist = %playlist.id, score, "Linked playlist");
                    attach_playlist(&mut enriched, &playlist);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "enrich", album = %combo.display_name(), error = %e, "Playlist search failed");
                }
            }
        }

        (enriched != *combo).then_some(enriched)
    }

    /// Load an album, enrich it and persist the result atomically.
    ///
    /// The lookups run against a snapshot; the findings are then merged
    /// onto the album as it is stored at save time, so downloads or repairs
    /// committed in between survive. Returns whether anything changed.
    pub async fn enrich_album(&self, album_id: i64) -> Result<bool> {
        let snapshot = db::load_combo(&self.pool, album_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("album {}", album_id)))?;

        let Some(enriched) = self.enrich(&snapshot).await else {
            return Ok(false);
        };
        let findings = without_local_state(enriched);

        let policy = self.strategy.policy();
        let saved = db::update_combo(&self.pool, album_id, |stored| {
            merge_combo(stored, &findings, policy);
        })
        .await?
        .ok_or_else(|| Error::not_found(format!("album {}", album_id)))?;

        tracing::info!(target: "enrich", album_id, album = %saved.display_name(), "Album enriched");
        Ok(true)
    }

    /// The release this combo describes: by id when known, else by search.
    async fn find_release(
        &self,
        metadata: &dyn MetadataApi,
        combo: &Combo,
    ) -> std::result::Result<Option<Release>, SourceError> {
        if let Some(id) = combo.album.musicbrainz_release_id.as_deref() {
            return metadata.fetch_release(id).await.map(Some);
        }

        let hits = metadata
            .search_releases(&combo.album.title, &combo.artist_string())
            .await?;
        match pick_release(combo, &hits) {
            Some(hit) => metadata.fetch_release(&hit.id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn backfill_artwork(&self, metadata: &dyn MetadataApi, combo: &mut Combo) {
        if combo.album.artwork_uri.is_some() {
            return;
        }
        let Some(release_id) = combo.album.musicbrainz_release_id.clone() else {
            return;
        };
        match metadata.fetch_cover_art(&release_id).await {
            Ok(Some(cover)) => combo.album.artwork_uri = Some(cover.url),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "enrich", release = %release_id, error = %e, "Cover art lookup failed");
            }
        }
    }
}

/// Local file state is owned by downloads and reconciliation. Enrichment
/// never discovers it, so a snapshot's copy must not be merged back.
fn without_local_state(mut combo: Combo) -> Combo {
    combo.album.is_local = false;
    combo.album.local_artwork_uri = None;
    for track in combo.tracks_mut() {
        track.local_uri = None;
    }
    combo
}

/// First search hit that is confident, has the same title and, when both
/// sides know it, the same track count.
fn pick_release<'a>(combo: &Combo, hits: &'a [ReleaseSummary]) -> Option<&'a ReleaseSummary> {
    let track_count = combo.tracks.len() as u32;
    hits.iter().find(|hit| {
        hit.score.unwrap_or(0) >= MIN_RELEASE_SCORE
            && hit.title.eq_ignore_ascii_case(&combo.album.title)
            && (track_count == 0 || hit.track_count.is_none_or(|n| n == track_count))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::traits::mocks::{MockMetadata, MockStreaming};
    use crate::test_utils::{mock_combo, mock_playlist, mock_release, temp_db, wait_until};
    use std::sync::atomic::Ordering;
    use tokio::sync::Semaphore;

    fn enricher(pool: SqlitePool, sources: Sources) -> Enricher {
        Enricher::new(pool, sources, &MatchingConfig::default())
    }

    #[tokio::test]
    async fn test_enrich_backfills_release_ids_without_erasing() {
        let (pool, _dir) = temp_db().await;
        let metadata = MockMetadata {
            cover: Some(vec![1, 2, 3]),
            ..MockMetadata::with_releases(vec![mock_release("rel-1", "Album", 3)])
        };
        let sources = Sources {
            metadata: Some(Arc::new(metadata)),
            ..Default::default()
        };

        let mut combo = mock_combo("Album", "Band", 3);
        combo.tracks[0].track.local_uri = Some("/music/01.flac".to_string());

        let enriched = enricher(pool, sources).enrich(&combo).await.unwrap();
        assert_eq!(enriched.album.musicbrainz_release_id.as_deref(), Some("rel-1"));
        assert_eq!(enriched.album.year, Some(2004));
        assert_eq!(enriched.tags, vec!["rock"]);
        assert!(enriched.album.artwork_uri.is_some());
        assert_eq!(enriched.tracks[2].track.musicbrainz_id.as_deref(), Some("rec-3"));
        assert_eq!(
            enriched.tracks[0].track.local_uri.as_deref(),
            Some("/music/01.flac")
        );
    }

    #[tokio::test]
    async fn test_enrich_links_playlist() {
        let (pool, _dir) = temp_db().await;
        let sources = Sources {
            streaming: Some(Arc::new(MockStreaming::with_playlists(vec![mock_playlist(
                "PL1", "Album", "Band", 4,
            )]))),
            ..Default::default()
        };

        let enriched = enricher(pool, sources)
            .enrich(&mock_combo("Album", "Band", 4))
            .await
            .unwrap();
        assert_eq!(enriched.album.playlist_id(), Some("PL1"));
        assert!(enriched.tracks.iter().all(|t| t.track.is_downloadable()));
    }

    #[tokio::test]
    async fn test_enrich_without_findings_is_none() {
        let (pool, _dir) = temp_db().await;
        let sources = Sources {
            metadata: Some(Arc::new(MockMetadata::with_error(SourceError::RateLimited))),
            streaming: Some(Arc::new(MockStreaming::no_matches())),
            ..Default::default()
        };
        assert!(
            enricher(pool, sources)
                .enrich(&mock_combo("Album", "Band", 2))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_enrich_album_persists() {
        let (pool, _dir) = temp_db().await;
        let mut combo = mock_combo("Album", "Band", 3);
        let album_id = db::save_combo(&pool, &mut combo).await.unwrap();

        let sources = Sources {
            metadata: Some(Arc::new(MockMetadata::with_releases(vec![mock_release(
                "rel-1", "Album", 3,
            )]))),
            ..Default::default()
        };
        let enricher = enricher(pool.clone(), sources);

        assert!(enricher.enrich_album(album_id).await.unwrap());
        let stored = db::load_combo(&pool, album_id).await.unwrap().unwrap();
        assert_eq!(stored.album.musicbrainz_release_id.as_deref(), Some("rel-1"));
        assert_eq!(stored.tracks.len(), 3);
        assert_eq!(stored.tags, vec!["rock"]);

        assert!(matches!(
            enricher.enrich_album(album_id + 100).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_enrich_album_keeps_download_finished_during_lookup() {
        let (pool, _dir) = temp_db().await;
        let mut combo = mock_combo("Album", "Band", 3);
        combo.album.musicbrainz_release_id = Some("rel-1".to_string());
        let album_id = db::save_combo(&pool, &mut combo).await.unwrap();
        let track_id = combo.tracks[0].track.id.unwrap();

        let gate = Arc::new(Semaphore::new(0));
        let metadata = Arc::new(MockMetadata {
            gate: Some(gate.clone()),
            ..MockMetadata::with_releases(vec![mock_release("rel-1", "Album", 3)])
        });
        let sources = Sources {
            metadata: Some(metadata.clone()),
            ..Default::default()
        };
        let enricher = enricher(pool.clone(), sources);
        let running = tokio::spawn(async move { enricher.enrich_album(album_id).await });

        wait_until(|| metadata.requested.load(Ordering::SeqCst) == 1).await;
        db::mark_track_downloaded(&pool, track_id, "/downloads/01.opus")
            .await
            .unwrap();
        gate.add_permits(1);
        assert!(running.await.unwrap().unwrap());

        let stored = db::load_combo(&pool, album_id).await.unwrap().unwrap();
        assert!(stored.album.is_local);
        assert_eq!(
            stored.tracks[0].track.local_uri.as_deref(),
            Some("/downloads/01.opus")
        );
        assert_eq!(stored.tracks[0].track.musicbrainz_id.as_deref(), Some("rec-1"));
        assert_eq!(stored.tags, vec!["rock"]);
    }

    #[tokio::test]
    async fn test_enrich_album_does_not_restore_cleared_file() {
        let (pool, _dir) = temp_db().await;
        let mut combo = mock_combo("Album", "Band", 2);
        combo.album.musicbrainz_release_id = Some("rel-1".to_string());
        combo.album.is_local = true;
        combo.tracks[0].track.local_uri = Some("/gone/01.opus".to_string());
        let album_id = db::save_combo(&pool, &mut combo).await.unwrap();
        let track_id = combo.tracks[0].track.id.unwrap();

        let gate = Arc::new(Semaphore::new(0));
        let metadata = Arc::new(MockMetadata {
            gate: Some(gate.clone()),
            ..MockMetadata::with_releases(vec![mock_release("rel-1", "Album", 2)])
        });
        let sources = Sources {
            metadata: Some(metadata.clone()),
            ..Default::default()
        };
        let enricher = enricher(pool.clone(), sources);
        let running = tokio::spawn(async move { enricher.enrich_album(album_id).await });

        wait_until(|| metadata.requested.load(Ordering::SeqCst) == 1).await;
        db::repair_local_state(&pool, &[(track_id, "/gone/01.opus".to_string())])
            .await
            .unwrap();
        gate.add_permits(1);
        assert!(running.await.unwrap().unwrap());

        let stored = db::load_combo(&pool, album_id).await.unwrap().unwrap();
        assert!(stored.tracks[0].track.local_uri.is_none());
        assert!(!stored.album.is_local);
    }

    #[test]
    fn test_pick_release_requires_confidence_and_track_count() {
        let combo = mock_combo("Album", "Band", 3);
        let hit = |id: &str, score: u32, count: u32| ReleaseSummary {
            id: id.to_string(),
            title: "album".to_string(),
            artist: "Band".to_string(),
            track_count: Some(count),
            score: Some(score),
        };
        let hits = vec![hit("weak", 60, 3), hit("deluxe", 100, 5), hit("ok", 95, 3)];
        assert_eq!(pick_release(&combo, &hits).unwrap().id, "ok");
    }
}
