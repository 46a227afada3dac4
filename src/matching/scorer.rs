//! Playable-match scoring against streaming playlists.

use std::time::Duration;

use crate::model::Combo;
use crate::sources::{RemotePlaylist, SourceError, StreamingApi};

/// Weight of the track-count component; durations carry the rest.
const COUNT_WEIGHT: f32 = 0.3;

/// Scores how well a streaming playlist matches a combo, in `0.0..=1.0`.
pub trait MatchScorer: Send + Sync {
    fn score(&self, combo: &Combo, candidate: &RemotePlaylist) -> f32;
}

/// Scores by track count and per-track duration alignment.
///
/// - A track-count difference above `track_count_tolerance` scores 0.
/// - Otherwise `0.3 * count_score + 0.7 * aligned_fraction`, where
///   `count_score = 1 - diff / max(len)` and `aligned_fraction` is the share
///   of positional pairs whose durations are both known and differ by at
///   most `duration_tolerance`.
///
/// A candidate without comparable durations therefore tops out at 0.3,
/// below any sensible confidence cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationAlignmentScorer {
    pub duration_tolerance: Duration,
    pub track_count_tolerance: usize,
}

impl Default for DurationAlignmentScorer {
    fn default() -> Self {
        Self {
            duration_tolerance: Duration::from_secs(5),
            track_count_tolerance: 0,
        }
    }
}

impl MatchScorer for DurationAlignmentScorer {
    fn score(&self, combo: &Combo, candidate: &RemotePlaylist) -> f32 {
        let ours = combo.durations_ms();
        let theirs: Vec<Option<u64>> = candidate.tracks.iter().map(|t| t.duration_ms).collect();

        let longest = ours.len().max(theirs.len());
        let pairs = ours.len().min(theirs.len());
        if pairs == 0 {
            return 0.0;
        }

        let diff = longest - pairs;
        if diff > self.track_count_tolerance {
            return 0.0;
        }
        let count_score = 1.0 - diff as f32 / longest as f32;

        let tolerance = self.duration_tolerance.as_millis() as u64;
        let aligned = ours
            .iter()
            .zip(&theirs)
            .filter(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => a.abs_diff(*b) <= tolerance,
                _ => false,
            })
            .count();
        let aligned_fraction = aligned as f32 / pairs as f32;

        COUNT_WEIGHT * count_score + (1.0 - COUNT_WEIGHT) * aligned_fraction
    }
}

/// Search the streaming backend for the best playlist matching `combo`.
///
/// Candidates returned without a tracklist are fetched in full before
/// scoring. Returns `None` when no candidate reaches `min_confidence`.
pub async fn best_match(
    streaming: &dyn StreamingApi,
    combo: &Combo,
    scorer: &dyn MatchScorer,
    min_confidence: f32,
) -> Result<Option<(RemotePlaylist, f32)>, SourceError> {
    let candidates = streaming
        .search(&combo.album.title, &combo.artist_string())
        .await?;

    let mut best: Option<(RemotePlaylist, f32)> = None;
    for candidate in candidates {
        let candidate = if candidate.tracks.is_empty() {
            match streaming.fetch_playlist(&candidate.id).await {
                Ok(full) => full,
                Err(e) => {
                    tracing::debug!(target: "matching", playlist = %candidate.id, error = %e, "Skipping candidate");
                    continue;
                }
            }
        } else {
            candidate
        };

        let score = scorer.score(combo, &candidate);
        tracing::debug!(target: "matching", playlist = %candidate.id, score, "Scored candidate");
        if score >= min_confidence && best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((candidate, score));
        }
    }

    Ok(best)
}
