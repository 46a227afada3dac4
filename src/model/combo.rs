//! The Combo bundle: one album with its credits, tracks and tags.

use serde::{Deserialize, Serialize};

use super::{Album, ArtistCredits, Track, join_credits};

/// A track together with its own artist credits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackCombo {
    pub track: Track,
    pub artists: ArtistCredits,
}

impl TrackCombo {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            artists: ArtistCredits::new(),
        }
    }
}

/// Transient bundle passed between conversion, matching, merging and
/// persistence. Never stored as a row of its own; it is the unit of an
/// atomic catalog write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Combo {
    pub album: Album,
    pub artists: ArtistCredits,
    pub tracks: Vec<TrackCombo>,
    pub tags: Vec<String>,
}

impl Combo {
    pub fn new(album: Album) -> Self {
        Self {
            album,
            ..Default::default()
        }
    }

    /// Album artist string, rendered with join phrases.
    pub fn artist_string(&self) -> String {
        join_credits(&self.artists)
    }

    /// Durations of the tracklist in order, `None` where unknown.
    pub fn durations_ms(&self) -> Vec<Option<u64>> {
        self.tracks.iter().map(|t| t.track.duration_ms).collect()
    }

    /// Label used in progress reporting and logs.
    pub fn display_name(&self) -> String {
        let artist = self.artist_string();
        if artist.is_empty() {
            self.album.title.clone()
        } else {
            format!("{} - {}", artist, self.album.title)
        }
    }

    /// Iterate the tracks mutably, without their credits.
    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut().map(|t| &mut t.track)
    }
}
