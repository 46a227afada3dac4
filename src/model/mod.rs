//! Core data models for the canonical catalog.
//!
//! Defines the primary entities: [`Album`], [`Track`] and [`ArtistCredit`],
//! plus the transient [`Combo`] bundle that matching, merging and persistence
//! pass around as one unit.
//!
//! These types are storage-agnostic. The `db` module owns the row shapes and
//! converts to and from them.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `albums` - Canonical releases with cross-source ids and flags
//! - `tracks` - Recordings, optionally attached to an album
//! - `artists` - Unique artist names referenced by credits
//! - `album_artist_credits` / `track_artist_credits` - Ordered credits

mod combo;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use combo::{Combo, TrackCombo};

/// Ordered artist credits. Almost every release has one or two.
pub type ArtistCredits = SmallVec<[ArtistCredit; 2]>;

/// Streaming-source descriptor attached to a track.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamSource {
    /// Remote id of the playable item on the streaming backend
    pub id: String,
    /// Resolved media URL, when the backend hands one out
    pub url: Option<String>,
    /// Remote thumbnail URL
    pub thumbnail: Option<String>,
}

impl StreamSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Streaming-playlist descriptor attached to an album.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistRef {
    /// Playlist id on the streaming backend
    pub id: String,
    /// Optional browse id for the album page
    pub browse_id: Option<String>,
}

impl PlaylistRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            browse_id: None,
        }
    }
}

/// One positional artist credit on an album or track.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtistCredit {
    /// Catalog artist id, filled in once persisted
    pub artist_id: Option<i64>,
    /// Credited name
    pub name: String,
    /// MusicBrainz artist id, if known
    pub musicbrainz_id: Option<String>,
    /// Phrase rendered after this credit (e.g. " & ", " feat. ")
    pub join_phrase: String,
}

impl ArtistCredit {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_join(mut self, join_phrase: impl Into<String>) -> Self {
        self.join_phrase = join_phrase.into();
        self
    }
}

/// Render credits positionally with their join phrases.
///
/// `["Simon", " & "], ["Garfunkel", ""]` renders as `Simon & Garfunkel`.
pub fn join_credits(credits: &[ArtistCredit]) -> String {
    let mut out = String::new();
    for credit in credits {
        out.push_str(&credit.name);
        out.push_str(&credit.join_phrase);
    }
    out.trim().to_string()
}

/// An album in the catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Album {
    /// Database ID (`None` until persisted)
    pub id: Option<i64>,
    pub title: String,
    /// Whether the user added this album to their library
    pub in_library: bool,
    /// True iff at least one track has locally stored audio
    pub is_local: bool,
    pub musicbrainz_release_id: Option<String>,
    pub musicbrainz_release_group_id: Option<String>,
    pub playlist: Option<PlaylistRef>,
    /// Remote artwork URL
    pub artwork_uri: Option<String>,
    /// Artwork saved next to the downloaded audio
    pub local_artwork_uri: Option<String>,
    pub year: Option<i32>,
    /// Marked for deletion by the user, purged by reconciliation
    pub is_deleted: bool,
    pub is_hidden: bool,
    /// Left behind by an operation that never finalized
    pub is_temp: bool,
}

impl Album {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist.as_ref().map(|p| p.id.as_str())
    }
}

/// A track in the catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    /// Database ID (`None` until persisted)
    pub id: Option<i64>,
    pub title: String,
    pub in_library: bool,
    pub album_id: Option<i64>,
    /// 1-based position on its disc
    pub album_position: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    /// Absolute path of the locally stored audio file
    pub local_uri: Option<String>,
    pub stream: Option<StreamSource>,
    /// MusicBrainz recording id
    pub musicbrainz_id: Option<String>,
    /// Scrobble backend id (track URL)
    pub scrobble_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub play_count: u32,
    pub is_temp: bool,
}

impl Track {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Has a streaming descriptor and no local file yet.
    pub fn is_downloadable(&self) -> bool {
        self.stream.is_some() && self.local_uri.is_none()
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_uri.is_some()
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream.as_ref().map(|s| s.id.as_str())
    }
}
