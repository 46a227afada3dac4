//! Last.fm HTTP client
//!
//! API: https://www.last.fm/api

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{adapter, dto};
use crate::sources::domain::{ScrobbleAlbum, ScrobbleAlbumSummary, SourceError};
use crate::sources::traits::ScrobbleApi;

const BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Last.fm error code for a missing album/artist
const ERROR_NOT_FOUND: u32 = 6;
/// Last.fm error code for exceeded rate limit
const ERROR_RATE_LIMITED: u32 = 29;

/// Last.fm API client
pub struct LastFmClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LastFmClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Call one API method with extra query parameters
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", &self.api_key),
            ("format", "json"),
        ];
        query.extend_from_slice(params);

        tracing::debug!(target: "sources::lastfm", method, "GET");
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }

        let body = response.text().await?;

        // Errors arrive as a JSON body, sometimes with HTTP 200
        if let Ok(error) = serde_json::from_str::<dto::ApiError>(&body) {
            return Err(match error.error {
                ERROR_NOT_FOUND => SourceError::NotFound(error.message),
                ERROR_RATE_LIMITED => SourceError::RateLimited,
                _ => SourceError::Api(error.message),
            });
        }

        if !status.is_success() {
            return Err(SourceError::Network(format!("HTTP {}", status)));
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ScrobbleApi for LastFmClient {
    async fn search_albums(&self, query: &str) -> Result<Vec<ScrobbleAlbumSummary>, SourceError> {
        let response: dto::AlbumSearchResponse =
            self.call("album.search", &[("album", query)]).await?;
        Ok(response
            .results
            .albummatches
            .album
            .into_vec()
            .into_iter()
            .map(adapter::to_summary)
            .collect())
    }

    async fn fetch_album(&self, artist: &str, title: &str) -> Result<ScrobbleAlbum, SourceError> {
        let response: dto::AlbumInfoResponse = self
            .call(
                "album.getinfo",
                &[("artist", artist), ("album", title), ("autocorrect", "1")],
            )
            .await?;
        Ok(adapter::to_album(response.album))
    }
}
