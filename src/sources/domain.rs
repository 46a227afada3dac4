//! Internal domain models for external source results.
//!
//! These types are OUR types - they don't change when external APIs change.
//! Every backend response gets converted into these types via adapters, and
//! from these into a canonical [`Combo`](crate::model::Combo) by
//! [`convert`](super::convert).

use std::path::PathBuf;

use crate::model::ArtistCredits;

/// Errors raised by any external backend call
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Backend not configured: {0}")]
    Unavailable(&'static str),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ============================================================================
// Streaming backend
// ============================================================================

/// A playlist (album page) on the streaming backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemotePlaylist {
    pub id: String,
    pub browse_id: Option<String>,
    pub title: String,
    /// Artist string as displayed by the backend
    pub artist: String,
    pub thumbnail: Option<String>,
    pub tracks: Vec<RemoteTrack>,
}

/// A playable item inside a [`RemotePlaylist`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteTrack {
    pub id: String,
    pub title: String,
    pub duration_ms: Option<u64>,
    /// Resolved media URL, if the backend provides one
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

// ============================================================================
// Structured-metadata backend
// ============================================================================

/// Search hit for a release
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReleaseSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub track_count: Option<u32>,
    /// Backend relevance score (0-100 for MusicBrainz)
    pub score: Option<u32>,
}

/// Full release with tracklist and genres
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Release {
    pub id: String,
    pub release_group_id: Option<String>,
    pub title: String,
    pub artists: ArtistCredits,
    pub year: Option<i32>,
    pub tracks: Vec<ReleaseTrack>,
    pub genres: Vec<String>,
}

/// One track of a [`Release`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReleaseTrack {
    /// Recording id
    pub recording_id: Option<String>,
    pub title: String,
    pub position: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub artists: ArtistCredits,
}

/// Downloaded cover art
#[derive(Debug, Clone)]
pub struct CoverArt {
    /// Image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type (image/jpeg or image/png)
    pub mime_type: String,
    /// Source URL
    pub url: String,
}

// ============================================================================
// Scrobble backend
// ============================================================================

/// Album search hit on the scrobble backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrobbleAlbumSummary {
    pub title: String,
    pub artist: String,
    pub url: Option<String>,
}

/// Album detail from the scrobble backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrobbleAlbum {
    pub title: String,
    pub artist: String,
    pub url: Option<String>,
    pub musicbrainz_release_id: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub tracks: Vec<ScrobbleTrack>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrobbleTrack {
    pub title: String,
    pub url: Option<String>,
    pub position: Option<u32>,
    pub duration_ms: Option<u64>,
}

// ============================================================================
// Local filesystem backend
// ============================================================================

/// An album found on disk that can be imported
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalAlbum {
    pub title: String,
    pub artist: String,
    /// MusicBrainz release id from the files' tags
    pub release_id: Option<String>,
    pub directory: PathBuf,
    pub year: Option<i32>,
    pub tracks: Vec<LocalTrack>,
}

/// One audio file of a [`LocalAlbum`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalTrack {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub position: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub duration_ms: Option<u64>,
    pub recording_id: Option<String>,
}
