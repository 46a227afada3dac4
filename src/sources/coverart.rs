//! Cover Art Archive HTTP client
//!
//! Fetches album artwork from the Cover Art Archive.
//! No API key required, but please respect their rate limits.
//!
//! API: https://coverartarchive.org

use super::domain::{CoverArt, SourceError};

/// Cover Art Archive client
pub struct CoverArtClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CoverArtClient {
    /// Build a client sharing an existing HTTP client (and its User-Agent)
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn front_url(&self, release_id: &str) -> String {
        // 500px thumbnail via the redirect endpoint
        format!("{}/release/{}/front-500", self.base_url, release_id)
    }

    /// Get the front cover for a MusicBrainz release, `None` if it has none
    pub async fn front_cover(&self, release_id: &str) -> Result<Option<CoverArt>, SourceError> {
        let url = self.front_url(release_id);
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(SourceError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let data = response.bytes().await?.to_vec();

        Ok(Some(CoverArt {
            data,
            mime_type,
            url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_url() {
        let client = CoverArtClient::new(reqwest::Client::new(), "https://coverartarchive.org/");
        assert_eq!(
            client.front_url("rel-1"),
            "https://coverartarchive.org/release/rel-1/front-500"
        );
    }
}
