//! On-disk layout of downloaded albums.
//!
//! `<root>/<Artist> - <Album>/NN - Title.<ext>` plus `cover.jpg` next to the
//! audio. The extension is chosen by the media fetcher, so this module only
//! builds stems.

use std::path::{Path, PathBuf};

/// Artwork file saved inside every album directory.
pub const COVER_FILE: &str = "cover.jpg";

/// Directory holding one album's files.
pub fn album_dir(root: &Path, artist: &str, album: &str) -> PathBuf {
    let artist = if artist.trim().is_empty() {
        "Unknown Artist"
    } else {
        artist.trim()
    };
    root.join(sanitize_filename(&format!("{} - {}", artist, album.trim())))
}

/// Path of a track's audio file without its extension.
///
/// Tracks beyond the first disc get a disc prefix so positions stay unique.
pub fn track_stem(dir: &Path, disc: Option<u32>, position: Option<u32>, title: &str) -> PathBuf {
    let number = position
        .map(|n| format!("{:02}", n))
        .unwrap_or_else(|| "00".to_string());
    let name = match disc {
        Some(d) if d > 1 => format!("{}-{} - {}", d, number, title.trim()),
        _ => format!("{} - {}", number, title.trim()),
    };
    dir.join(sanitize_filename(&name))
}

pub fn cover_path(dir: &Path) -> PathBuf {
    dir.join(COVER_FILE)
}

/// Replace characters that are invalid in file names on any platform.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}
