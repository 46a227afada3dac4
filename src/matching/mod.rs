//! Multi-source matching and merging.
//!
//! - [`merge`]: coalesce rules and the named track merge policies
//! - [`identity`]: which catalog album a local scan describes
//! - [`scorer`]: playable-match scoring against streaming playlists
//! - [`enricher`]: backfilling catalog albums from other backends

pub mod enricher;
pub mod identity;
pub mod merge;
pub mod scorer;

pub use enricher::Enricher;
pub use identity::resolve_local_identity;
pub use merge::{
    Coalesce, KeepLeast, KeepSelf, MergeStrategy, TrackMergePolicy, merge_combo,
};
pub use scorer::{DurationAlignmentScorer, MatchScorer, best_match};

/// Minimum playable-match score accepted by default.
///
/// With the default scorer a same-length tracklist needs about two thirds
/// of its durations aligned to pass.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.75;
