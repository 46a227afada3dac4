//! Last.fm API Data Transfer Objects
//!
//! These types match what the Last.fm 2.0 JSON API returns.
//! DO NOT use these types outside the lastfm module - convert to domain types.
//!
//! Last.fm collapses single-element lists into a bare object and empty
//! lists into `""`, so list fields go through [`OneOrMany`].

use serde::{Deserialize, Serialize};

/// A list that may be encoded as an array, a single object, or an empty string
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
    Empty(String),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
            Self::Empty(_) => Vec::new(),
        }
    }
}

/// `album.search` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumSearchResponse {
    pub results: SearchResults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResults {
    pub albummatches: AlbumMatches,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumMatches {
    #[serde(default)]
    pub album: OneOrMany<AlbumMatch>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumMatch {
    pub name: String,
    pub artist: String,
    pub url: Option<String>,
    pub mbid: Option<String>,
}

/// `album.getinfo` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfoResponse {
    pub album: AlbumInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfo {
    pub name: String,
    pub artist: String,
    pub url: Option<String>,
    pub mbid: Option<String>,
    #[serde(default)]
    pub image: Vec<Image>,
    #[serde(default)]
    pub tags: OneOrMany<Tags>,
    pub tracks: Option<Tracks>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    #[serde(rename = "#text")]
    pub url: String,
    /// small, medium, large, extralarge, mega
    pub size: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tags {
    #[serde(default)]
    pub tag: OneOrMany<Tag>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tracks {
    #[serde(default)]
    pub track: OneOrMany<Track>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    pub name: String,
    pub url: Option<String>,
    /// Seconds
    pub duration: Option<u64>,
    #[serde(rename = "@attr")]
    pub attr: Option<TrackAttr>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackAttr {
    pub rank: u32,
}

/// Error payload; Last.fm may send it with HTTP 200
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: u32,
    pub message: String,
}

// ============================================================================
// CONTRACT TESTS
// ============================================================================

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let json = r#"{
            "results": {
                "opensearch:totalResults": "2",
                "albummatches": {
                    "album": [
                        {"name": "Bookends", "artist": "Simon & Garfunkel", "url": "https://www.last.fm/music/x", "mbid": ""},
                        {"name": "Bookends (Remastered)", "artist": "Simon & Garfunkel", "url": null}
                    ]
                }
            }
        }"#;

        let response: AlbumSearchResponse =
            serde_json::from_str(json).expect("Should parse search response");
        assert_eq!(response.results.albummatches.album.into_vec().len(), 2);
    }

    #[test]
    fn test_parse_album_info_with_single_track_and_no_tags() {
        let json = r##"{
            "album": {
                "name": "Single",
                "artist": "Band",
                "mbid": "rel-1",
                "image": [{"#text": "https://img/large.png", "size": "large"}],
                "tags": "",
                "tracks": {
                    "track": {"name": "Only Song", "duration": 201, "@attr": {"rank": 1}}
                }
            }
        }"##;

        let response: AlbumInfoResponse =
            serde_json::from_str(json).expect("Should parse album info");
        let album = response.album;
        assert!(album.tags.into_vec().is_empty());
        let tracks = album.tracks.unwrap().track.into_vec();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].duration, Some(201));
        assert_eq!(tracks[0].attr.as_ref().unwrap().rank, 1);
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{"error": 6, "message": "Album not found"}"#;
        let error: ApiError = serde_json::from_str(json).expect("Should parse error");
        assert_eq!(error.error, 6);
    }
}
