//! Trait definitions for external backends.
//!
//! The reconciliation core only ever talks to these traits. Production code
//! plugs in the real clients; tests substitute the mocks below.
//!
//! # Example
//!
//! ```ignore
//! use music_steward::sources::MetadataApi;
//!
//! async fn title_of(api: &dyn MetadataApi, id: &str) -> Result<String, SourceError> {
//!     Ok(api.fetch_release(id).await?.title)
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::domain::{
    CoverArt, LocalAlbum, Release, ReleaseSummary, RemotePlaylist, ScrobbleAlbum,
    ScrobbleAlbumSummary, SourceError,
};
use crate::model::StreamSource;

/// Streaming-search backend (album playlists with playable items).
#[async_trait]
pub trait StreamingApi: Send + Sync {
    /// Search album playlists by title and artist.
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<RemotePlaylist>, SourceError>;

    /// Fetch one playlist with its full tracklist.
    async fn fetch_playlist(&self, playlist_id: &str) -> Result<RemotePlaylist, SourceError>;
}

/// Structured-metadata backend (releases, recordings, genres, artwork).
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// Search releases by title and artist.
    async fn search_releases(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Vec<ReleaseSummary>, SourceError>;

    /// Fetch a release with tracklist and genres.
    async fn fetch_release(&self, release_id: &str) -> Result<Release, SourceError>;

    /// Front cover for a release, `None` if the release has none.
    async fn fetch_cover_art(&self, release_id: &str) -> Result<Option<CoverArt>, SourceError>;

    /// The backend's full controlled genre vocabulary.
    async fn list_genres(&self) -> Result<Vec<String>, SourceError>;
}

/// Scrobble backend, used as an alternate import source.
#[async_trait]
pub trait ScrobbleApi: Send + Sync {
    async fn search_albums(&self, query: &str) -> Result<Vec<ScrobbleAlbumSummary>, SourceError>;

    async fn fetch_album(&self, artist: &str, title: &str) -> Result<ScrobbleAlbum, SourceError>;
}

/// Fetches audio and images for the download scheduler.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the audio behind `stream` next to `dest_stem`.
    ///
    /// The fetcher picks the file extension; the final path is returned.
    async fn download_audio(
        &self,
        stream: &StreamSource,
        dest_stem: &Path,
    ) -> Result<PathBuf, SourceError>;

    /// Fetch raw image bytes.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// Local-filesystem backend.
pub trait LocalLibrary: Send + Sync {
    /// Scan `root` for importable albums, skipping files whose path is in
    /// `known_uris`. Albums whose files are all known are not yielded.
    fn scan(&self, root: PathBuf, known_uris: HashSet<String>) -> BoxStream<'static, LocalAlbum>;
}
