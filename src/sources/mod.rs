//! External source backends.
//!
//! Architecture:
//! - `traits.rs` - Trait definitions the core depends on (mockable)
//! - `domain.rs` - Our internal types (stable, API-agnostic)
//! - `convert.rs` - Backend shapes to canonical Combos
//! - `musicbrainz/`, `lastfm/` - DTO / adapter / client per API
//! - `coverart.rs`, `http_fetcher.rs`, `local.rs` - Artwork, media and files
//!
//! Data flow: API Response -> DTO -> Adapter -> Domain Model -> Combo

pub mod convert;
pub mod coverart;
pub mod domain;
pub mod http_fetcher;
pub mod lastfm;
pub mod local;
pub mod musicbrainz;
pub mod traits;

use std::sync::Arc;

pub use domain::{
    CoverArt, LocalAlbum, LocalTrack, Release, ReleaseSummary, ReleaseTrack, RemotePlaylist,
    RemoteTrack, ScrobbleAlbum, ScrobbleAlbumSummary, ScrobbleTrack, SourceError,
};
pub use http_fetcher::HttpMediaFetcher;
pub use lastfm::LastFmClient;
pub use local::FilesystemLibrary;
pub use musicbrainz::MusicBrainzClient;
pub use traits::{LocalLibrary, MediaFetcher, MetadataApi, ScrobbleApi, StreamingApi};

use crate::config::Config;

/// The backends handed to the core. Any of them may be missing.
#[derive(Clone, Default)]
pub struct Sources {
    pub streaming: Option<Arc<dyn StreamingApi>>,
    pub metadata: Option<Arc<dyn MetadataApi>>,
    pub scrobble: Option<Arc<dyn ScrobbleApi>>,
    pub local: Option<Arc<dyn LocalLibrary>>,
    pub fetcher: Option<Arc<dyn MediaFetcher>>,
}

impl Sources {
    /// Build the concrete backends available for `config`.
    ///
    /// The streaming backend needs an authenticated session supplied by the
    /// embedding application, so it is never built here.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let scrobble = config
            .credentials
            .lastfm_api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| Arc::new(LastFmClient::new(key.clone())) as Arc<dyn ScrobbleApi>);

        Ok(Self {
            streaming: None,
            metadata: Some(Arc::new(MusicBrainzClient::new(&config.musicbrainz)?)),
            scrobble,
            local: Some(Arc::new(FilesystemLibrary)),
            fetcher: Some(Arc::new(HttpMediaFetcher::new()?)),
        })
    }

    pub fn with_streaming(mut self, streaming: Arc<dyn StreamingApi>) -> Self {
        self.streaming = Some(streaming);
        self
    }

    pub fn streaming(&self) -> Result<&Arc<dyn StreamingApi>, SourceError> {
        self.streaming
            .as_ref()
            .ok_or(SourceError::Unavailable("streaming"))
    }

    pub fn metadata(&self) -> Result<&Arc<dyn MetadataApi>, SourceError> {
        self.metadata
            .as_ref()
            .ok_or(SourceError::Unavailable("metadata"))
    }

    pub fn scrobble(&self) -> Result<&Arc<dyn ScrobbleApi>, SourceError> {
        self.scrobble
            .as_ref()
            .ok_or(SourceError::Unavailable("scrobble"))
    }

    pub fn local(&self) -> Result<&Arc<dyn LocalLibrary>, SourceError> {
        self.local.as_ref().ok_or(SourceError::Unavailable("local"))
    }

    pub fn fetcher(&self) -> Result<&Arc<dyn MediaFetcher>, SourceError> {
        self.fetcher
            .as_ref()
            .ok_or(SourceError::Unavailable("media fetcher"))
    }
}
