//! HTTP media fetcher for the download scheduler.
//!
//! Streams audio behind a resolved stream URL to disk and fetches artwork.
//! Audio is written to a `.part` file first and renamed once complete so an
//! interrupted download never leaves a file that looks finished.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::domain::SourceError;
use super::traits::MediaFetcher;
use crate::model::StreamSource;

/// Extension used when neither the content type nor the URL names one
const DEFAULT_EXTENSION: &str = "m4a";

pub struct HttpMediaFetcher {
    http_client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("MusicSteward/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Network(format!("HTTP {} for {}", status, url)));
        }
        Ok(response)
    }
}

/// Append `.ext` to `path` without touching dots already in the file name.
pub(crate) fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// File extension for an audio response
fn audio_extension(content_type: Option<&str>, url: &str) -> &'static str {
    let from_mime = content_type.and_then(|mime| {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        Some(match essence {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/mp4" | "audio/x-m4a" | "audio/aac" => "m4a",
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/opus" => "opus",
            "audio/flac" | "audio/x-flac" => "flac",
            _ => return None,
        })
    });

    from_mime
        .or_else(|| {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            let ext = path.rsplit_once('.')?.1.to_lowercase();
            ["mp3", "m4a", "webm", "ogg", "opus", "flac"]
                .into_iter()
                .find(|known| *known == ext)
        })
        .unwrap_or(DEFAULT_EXTENSION)
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn download_audio(
        &self,
        stream: &StreamSource,
        dest_stem: &Path,
    ) -> Result<PathBuf, SourceError> {
        let url = stream
            .url
            .as_deref()
            .ok_or_else(|| SourceError::NotFound(format!("media URL for {}", stream.id)))?;

        let mut response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let path = append_extension(dest_stem, audio_extension(content_type.as_deref(), url));
        let partial = append_extension(&path, "part");

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &path).await?;
        tracing::debug!(target: "download", id = %stream.id, bytes = written, path = %path.display(), "Audio written");
        Ok(path)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_extension_keeps_dots_in_title() {
        let path = append_extension(Path::new("/music/Band - Album/03 - Mr. Blue"), "opus");
        assert_eq!(path, PathBuf::from("/music/Band - Album/03 - Mr. Blue.opus"));
    }

    #[test]
    fn test_audio_extension_from_content_type() {
        assert_eq!(audio_extension(Some("audio/webm; codecs=opus"), "https://x/a"), "webm");
        assert_eq!(audio_extension(Some("audio/mpeg"), "https://x/a.ogg"), "mp3");
    }

    #[test]
    fn test_audio_extension_from_url() {
        assert_eq!(
            audio_extension(Some("application/octet-stream"), "https://x/a.FLAC?sig=1"),
            "flac"
        );
        assert_eq!(audio_extension(None, "https://x/stream"), DEFAULT_EXTENSION);
    }

    #[tokio::test]
    async fn test_download_without_url_is_not_found() {
        let fetcher = HttpMediaFetcher::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = fetcher
            .download_audio(&StreamSource::new("vid-1"), &dir.path().join("01 - Song"))
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }
}
