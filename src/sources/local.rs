//! Local-filesystem backend.
//!
//! Walks a music tree, reads tags with lofty and groups audio files per
//! directory into importable [`LocalAlbum`]s. Files whose path is already
//! referenced by the catalog are skipped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use futures::stream::BoxStream;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use super::domain::{LocalAlbum, LocalTrack};
use super::traits::LocalLibrary;

/// Supported extensions (compared lowercase)
const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "flac", "ogg", "opus", "wav", "m4a", "aac"];

const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Scans a directory tree with `walkdir` + `lofty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemLibrary;

impl LocalLibrary for FilesystemLibrary {
    fn scan(&self, root: PathBuf, known_uris: HashSet<String>) -> BoxStream<'static, LocalAlbum> {
        let (tx, rx) = mpsc::channel(16);

        // Spawn a blocking task to perform the synchronous file system traversal
        tokio::task::spawn_blocking(move || {
            for (dir, files) in collect_audio_files(&root, &known_uris) {
                let tags: Vec<FileTags> = files.iter().map(|path| read_file(path)).collect();
                let album = group_album(&dir, tags);
                // Receiver dropped: stop scanning
                if tx.blocking_send(album).is_err() {
                    break;
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|album| (album, rx))
        }))
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Unknown audio files grouped by parent directory, sorted by path
fn collect_audio_files(root: &Path, known_uris: &HashSet<String>) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio_file(path) {
            continue;
        }
        if known_uris.contains(path.to_string_lossy().as_ref()) {
            continue;
        }
        let dir = path.parent().unwrap_or(root).to_path_buf();
        groups.entry(dir).or_default().push(path.to_path_buf());
    }
    groups
}

/// Tags read from one file, including the album-level fields
#[derive(Debug, Clone, Default)]
struct FileTags {
    track: LocalTrack,
    album: Option<String>,
    album_artist: Option<String>,
    release_id: Option<String>,
}

/// Read tags from one file; unreadable files fall back to the file name
fn read_file(path: &Path) -> FileTags {
    match read_tags(path) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::debug!(target: "sources::local", path = %path.display(), error = %e, "No readable tags");
            FileTags {
                track: fallback_track(path),
                ..Default::default()
            }
        }
    }
}

fn read_tags(path: &Path) -> Result<FileTags, lofty::error::LoftyError> {
    let tagged_file = Probe::open(path)?.read()?;
    let duration = tagged_file.properties().duration();
    let fallback = fallback_track(path);

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return Ok(FileTags {
            track: LocalTrack {
                duration_ms: Some(duration.as_millis() as u64),
                ..fallback
            },
            ..Default::default()
        });
    };

    let text = |key: &ItemKey| {
        tag.get_string(key)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let track = LocalTrack {
        path: path.to_path_buf(),
        title: tag
            .title()
            .map(|s| s.to_string())
            .unwrap_or(fallback.title),
        artist: tag
            .artist()
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        position: tag.track().or(fallback.position),
        disc_number: tag.disk(),
        year: tag.year().map(|y| y as i32),
        duration_ms: Some(duration.as_millis() as u64).filter(|ms| *ms > 0),
        recording_id: text(&ItemKey::MusicBrainzRecordingId),
    };

    Ok(FileTags {
        album: tag.album().map(|s| s.to_string()),
        album_artist: text(&ItemKey::AlbumArtist),
        release_id: text(&ItemKey::MusicBrainzReleaseId),
        track,
    })
}

/// Track derived from a file name like `03 - Title.flac`
fn fallback_track(path: &Path) -> LocalTrack {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    let position = digits.parse().ok();
    let title = stem[digits.len()..]
        .trim_start_matches([' ', '-', '.', '_'])
        .trim();

    LocalTrack {
        path: path.to_path_buf(),
        title: if title.is_empty() { stem.clone() } else { title.to_string() },
        artist: UNKNOWN_ARTIST.to_string(),
        position,
        ..Default::default()
    }
}

/// Most frequent non-empty value, ties broken by first appearance
fn most_common<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, value) in values.flatten().filter(|v| !v.is_empty()).enumerate() {
        counts.entry(value).or_insert((0, index)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        .map(|(value, _)| value.to_string())
}

/// Build one album from the files of a directory
fn group_album(dir: &Path, files: Vec<FileTags>) -> LocalAlbum {
    let title = most_common(files.iter().map(|f| f.album.as_deref())).unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let artist = most_common(files.iter().map(|f| f.album_artist.as_deref()))
        .or_else(|| {
            most_common(
                files
                    .iter()
                    .map(|f| Some(f.track.artist.as_str()).filter(|a| *a != UNKNOWN_ARTIST)),
            )
        })
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let release_id = most_common(files.iter().map(|f| f.release_id.as_deref()));
    let year = files.iter().find_map(|f| f.track.year);

    let mut tracks: Vec<LocalTrack> = files.into_iter().map(|f| f.track).collect();
    tracks.sort_by_key(|t| (t.disc_number.unwrap_or(1), t.position.unwrap_or(u32::MAX)));

    LocalAlbum {
        title,
        artist,
        release_id,
        directory: dir.to_path_buf(),
        year,
        tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fs::File;
    use tempfile::tempdir;

    fn tagged(title: &str, album: &str, artist: &str, position: u32) -> FileTags {
        FileTags {
            track: LocalTrack {
                path: PathBuf::from(format!("/music/{}.flac", title)),
                title: title.to_string(),
                artist: artist.to_string(),
                position: Some(position),
                ..Default::default()
            },
            album: Some(album.to_string()),
            album_artist: None,
            release_id: Some("rel-1".to_string()),
        }
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("song.mp3")));
        assert!(is_audio_file(Path::new("UPPER.FLAC")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn test_fallback_track_parses_number_and_title() {
        let track = fallback_track(Path::new("/x/03 - Song Name.mp3"));
        assert_eq!(track.position, Some(3));
        assert_eq!(track.title, "Song Name");

        let track = fallback_track(Path::new("/x/Intro.mp3"));
        assert_eq!(track.position, None);
        assert_eq!(track.title, "Intro");
    }

    #[test]
    fn test_group_album_uses_majority_tags_and_sorts() {
        let album = group_album(
            Path::new("/music/dir"),
            vec![
                tagged("Two", "Album", "Band", 2),
                tagged("One", "Album", "Band", 1),
                tagged("Bonus", "Album (Deluxe)", "Band", 3),
            ],
        );
        assert_eq!(album.title, "Album");
        assert_eq!(album.artist, "Band");
        assert_eq!(album.release_id.as_deref(), Some("rel-1"));
        let titles: Vec<_> = album.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Bonus"]);
    }

    #[test]
    fn test_group_album_prefers_album_artist() {
        let mut first = tagged("One", "Comp", "Singer A", 1);
        first.album_artist = Some("Various Artists".to_string());
        let second = tagged("Two", "Comp", "Singer B", 2);
        let album = group_album(Path::new("/music/comp"), vec![first, second]);
        assert_eq!(album.artist, "Various Artists");
    }

    #[tokio::test]
    async fn test_scan_groups_per_directory_and_skips_known() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        let first = root.join("First Album");
        let second = root.join("Second Album");
        std::fs::create_dir(&first).unwrap();
        std::fs::create_dir(&second).unwrap();
        File::create(first.join("01 - Opening.mp3")).unwrap();
        File::create(first.join("02 - Closing.mp3")).unwrap();
        File::create(first.join("notes.txt")).unwrap(); // Should be ignored
        File::create(second.join("01 - Known.flac")).unwrap();

        let known: HashSet<String> = [second.join("01 - Known.flac").to_string_lossy().into_owned()]
            .into_iter()
            .collect();

        let albums: Vec<LocalAlbum> = FilesystemLibrary.scan(root.to_path_buf(), known).collect().await;

        assert_eq!(albums.len(), 1);
        let album = &albums[0];
        assert_eq!(album.title, "First Album");
        assert_eq!(album.artist, UNKNOWN_ARTIST);
        assert_eq!(album.tracks.len(), 2);
        assert_eq!(album.tracks[0].title, "Opening");
        assert_eq!(album.tracks[1].position, Some(2));
    }
}
