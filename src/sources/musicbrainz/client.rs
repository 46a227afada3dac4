//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to 1 req/sec.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{adapter, dto};
use crate::config::MusicBrainzConfig;
use crate::sources::coverart::CoverArtClient;
use crate::sources::domain::{CoverArt, Release, ReleaseSummary, SourceError};
use crate::sources::traits::MetadataApi;

/// Minimum spacing between two requests
const REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Search results requested per query
const SEARCH_LIMIT: u32 = 10;

/// MusicBrainz API client, also serving cover art through the Cover Art Archive
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    coverart: CoverArtClient,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

/// User agent string - MusicBrainz requires this
fn user_agent(contact: &str) -> String {
    format!("MusicSteward/{} ( {} )", env!("CARGO_PKG_VERSION"), contact)
}

impl MusicBrainzClient {
    pub fn new(config: &MusicBrainzConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent(&config.contact))
            .build()?;

        Ok(Self {
            coverart: CoverArtClient::new(http_client.clone(), &config.coverart_url),
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Wait until the rate limit allows another request
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < REQUEST_INTERVAL {
                tokio::time::sleep(REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Send a GET request and map HTTP failures to [`SourceError`]
    async fn send(&self, url: &str, what: &str) -> Result<reqwest::Response, SourceError> {
        self.throttle().await;
        tracing::debug!(target: "sources::musicbrainz", %url, "GET");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(what.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            // Try to parse error response
            if let Ok(error) = response.json::<dto::ApiError>().await {
                return Err(SourceError::Api(error.error));
            }
            return Err(SourceError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, SourceError> {
        self.send(url, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

/// Lucene query for a release search, with quotes escaped
fn release_query(title: &str, artist: &str) -> String {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
    if artist.trim().is_empty() {
        format!("release:\"{}\"", escape(title))
    } else {
        format!(
            "release:\"{}\" AND artist:\"{}\"",
            escape(title),
            escape(artist)
        )
    }
}

#[async_trait]
impl MetadataApi for MusicBrainzClient {
    async fn search_releases(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Vec<ReleaseSummary>, SourceError> {
        let url = format!(
            "{}/release?fmt=json&limit={}&query={}",
            self.base_url,
            SEARCH_LIMIT,
            urlencoding::encode(&release_query(title, artist))
        );
        let response: dto::ReleaseSearchResponse = self.get_json(&url, title).await?;
        Ok(response
            .releases
            .into_iter()
            .map(adapter::to_summary)
            .collect())
    }

    async fn fetch_release(&self, release_id: &str) -> Result<Release, SourceError> {
        let url = format!(
            "{}/release/{}?fmt=json&inc=artist-credits+recordings+release-groups+genres",
            self.base_url, release_id
        );
        let response: dto::ReleaseResponse = self.get_json(&url, release_id).await?;
        Ok(adapter::to_release(response))
    }

    async fn fetch_cover_art(&self, release_id: &str) -> Result<Option<CoverArt>, SourceError> {
        self.coverart.front_cover(release_id).await
    }

    async fn list_genres(&self) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/genre/all?fmt=txt", self.base_url);
        let body = self.send(&url, "genre list").await?.text().await?;
        Ok(adapter::parse_genre_list(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MusicBrainzClient::new(&MusicBrainzConfig::default()).unwrap();
        assert_eq!(client.base_url, "https://musicbrainz.org/ws/2");
    }

    #[test]
    fn test_client_with_custom_url() {
        let config = MusicBrainzConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let client = MusicBrainzClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_user_agent_format() {
        let agent = user_agent("me@example.com");
        assert!(agent.starts_with("MusicSteward/"));
        assert!(agent.ends_with("( me@example.com )"));
    }

    #[test]
    fn test_release_query_escapes_quotes() {
        assert_eq!(
            release_query("Say \"Hi\"", "Band"),
            "release:\"Say \\\"Hi\\\"\" AND artist:\"Band\""
        );
        assert_eq!(release_query("Solo", " "), "release:\"Solo\"");
    }
}
