//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-steward\config.toml
//! - macOS: ~/Library/Application Support/music-steward/config.toml
//! - Linux: ~/.config/music-steward/config.toml
//!
//! The config file is human-readable and editable. Settings are
//! loaded at startup; a broken file never prevents startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matching::{DurationAlignmentScorer, MergeStrategy};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials for external backends
    pub credentials: Credentials,

    /// Library locations and startup behaviour
    pub library: LibraryConfig,

    /// Download scheduler settings
    pub downloads: DownloadConfig,

    /// Playable-match and merge settings
    pub matching: MatchingConfig,

    /// MusicBrainz client settings
    pub musicbrainz: MusicBrainzConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Last.fm API key for scrobble-backend album lookups
    pub lastfm_api_key: Option<String>,
}

/// Library management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Catalog database file (relative paths resolve against the data dir)
    pub database: PathBuf,

    /// Local music tree scanned for auto-import
    pub music_dir: Option<PathBuf>,

    /// Root directory for downloaded albums
    pub download_dir: PathBuf,

    /// Scan the music tree for new albums during startup reconciliation
    pub auto_import: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let data = data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database: data.join("catalog.db"),
            music_dir: dirs::audio_dir(),
            download_dir: data.join("downloads"),
            auto_import: false,
        }
    }
}

/// Download scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Ceiling on simultaneously running downloads
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

/// Playable-match and merge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum score (0.0 - 1.0) a playlist candidate needs to be accepted
    pub min_confidence: f32,

    /// Per-track duration difference still counted as aligned
    pub duration_tolerance_secs: u64,

    /// Allowed difference in track count between combo and candidate
    pub track_count_tolerance: usize,

    /// Track-level merge policy used during enrichment
    pub merge_strategy: MergeStrategy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence: crate::matching::DEFAULT_MIN_CONFIDENCE,
            duration_tolerance_secs: 5,
            track_count_tolerance: 0,
            merge_strategy: MergeStrategy::KeepSelf,
        }
    }
}

impl MatchingConfig {
    /// Build the playable-match scorer from these settings.
    pub fn scorer(&self) -> DurationAlignmentScorer {
        DurationAlignmentScorer {
            duration_tolerance: Duration::from_secs(self.duration_tolerance_secs),
            track_count_tolerance: self.track_count_tolerance,
        }
    }
}

/// MusicBrainz client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicBrainzConfig {
    /// Web service root
    pub base_url: String,

    /// Cover Art Archive root
    pub coverart_url: String,

    /// Contact URL or e-mail sent in the User-Agent header
    pub contact: String,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            coverart_url: "https://coverartarchive.org".to_string(),
            contact: "https://github.com/music-steward".to_string(),
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-steward"))
}

/// Get the data directory path (database, downloads)
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("music-steward"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load the config file, falling back to defaults.
///
/// A missing or broken file never stops startup.
pub fn load() -> Config {
    match config_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!(target: "config", "No config directory on this platform, using defaults");
            Config::default()
        }
    }
}

/// Load `path`, falling back to defaults the same way [`load`] does.
pub fn load_from(path: &Path) -> Config {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(target: "config", path = %path.display(), "No config file, using defaults");
            return Config::default();
        }
        Err(e) => {
            tracing::warn!(target: "config", path = %path.display(), error = %e, "Unreadable config file, using defaults");
            return Config::default();
        }
    };

    match toml::from_str(&contents) {
        Ok(config) => {
            tracing::debug!(target: "config", path = %path.display(), "Config loaded");
            config
        }
        Err(e) => {
            tracing::warn!(target: "config", path = %path.display(), error = %e, "Invalid config file, using defaults");
            Config::default()
        }
    }
}

/// Write the config file into the OS config directory.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Write `config` to `path` through a temp file and a rename.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", path = %path.display(), "Config saved");
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[credentials]"));
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[downloads]"));
        assert!(toml.contains("[matching]"));
        assert!(toml.contains("merge_strategy = \"keep_self\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.credentials.lastfm_api_key = Some("test-key-123".to_string());
        config.downloads.max_concurrent = 5;
        config.matching.merge_strategy = MergeStrategy::KeepLeast;
        config.library.music_dir = Some(PathBuf::from("/music"));

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(
            parsed.credentials.lastfm_api_key,
            Some("test-key-123".to_string())
        );
        assert_eq!(parsed.downloads.max_concurrent, 5);
        assert_eq!(parsed.matching.merge_strategy, MergeStrategy::KeepLeast);
        assert_eq!(parsed.library.music_dir, Some(PathBuf::from("/music")));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[downloads]
max_concurrent = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.downloads.max_concurrent, 8);
        assert_eq!(config.matching.min_confidence, 0.75);
        assert_eq!(config.matching.duration_tolerance_secs, 5);
        assert!(!config.library.auto_import);
        assert!(config.credentials.lastfm_api_key.is_none());
    }

    #[test]
    fn test_scorer_from_config() {
        let matching = MatchingConfig {
            duration_tolerance_secs: 3,
            track_count_tolerance: 1,
            ..Default::default()
        };
        let scorer = matching.scorer();
        assert_eq!(scorer.duration_tolerance, Duration::from_secs(3));
        assert_eq!(scorer.track_count_tolerance, 1);
    }

    #[test]
    fn test_save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.library.auto_import = true;
        config.downloads.max_concurrent = 2;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path);
        assert!(loaded.library.auto_import);
        assert_eq!(loaded.downloads.max_concurrent, 2);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_broken_or_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_from(&dir.path().join("absent.toml"));
        assert_eq!(missing.downloads.max_concurrent, 3);

        let broken = dir.path().join("config.toml");
        std::fs::write(&broken, "[downloads\nmax_concurrent = ").unwrap();
        assert_eq!(load_from(&broken).downloads.max_concurrent, 3);
    }
}
