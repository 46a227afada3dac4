//! Identity resolution for local-filesystem imports.

use crate::db::AlbumSummary;
use crate::model::{Album, Combo};

/// Find the catalog album a locally scanned combo describes.
///
/// Checked in order, first hit wins:
/// 1. release id present on both sides and equal
/// 2. exact `(title, joined artist)` match
///
/// `None` means the candidate is a new album.
pub fn resolve_local_identity(candidate: &Combo, existing: &[AlbumSummary]) -> Option<Album> {
    if let Some(release_id) = candidate.album.musicbrainz_release_id.as_deref()
        && let Some(hit) = existing
            .iter()
            .find(|s| s.album.musicbrainz_release_id.as_deref() == Some(release_id))
    {
        return Some(hit.album.clone());
    }

    let artist = candidate.artist_string();
    existing
        .iter()
        .find(|s| s.album.title == candidate.album.title && s.artist == artist)
        .map(|s| s.album.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_combo;

    fn summary(id: i64, title: &str, artist: &str, release_id: Option<&str>) -> AlbumSummary {
        AlbumSummary {
            album: Album {
                id: Some(id),
                musicbrainz_release_id: release_id.map(String::from),
                ..Album::new(title)
            },
            artist: artist.to_string(),
            track_count: 10,
        }
    }

    #[test]
    fn test_release_id_wins_over_title() {
        let catalog = vec![
            summary(1, "Album", "Band", None),
            summary(2, "Album (Remaster)", "Band", Some("rel-1")),
        ];
        let mut candidate = mock_combo("Album", "Band", 3);
        candidate.album.musicbrainz_release_id = Some("rel-1".to_string());

        let found = resolve_local_identity(&candidate, &catalog).unwrap();
        assert_eq!(found.id, Some(2));
    }

    #[test]
    fn test_falls_back_to_title_and_artist() {
        let catalog = vec![summary(1, "Album", "Band", Some("rel-other"))];
        let mut candidate = mock_combo("Album", "Band", 3);
        candidate.album.musicbrainz_release_id = Some("rel-1".to_string());

        assert_eq!(resolve_local_identity(&candidate, &catalog).unwrap().id, Some(1));
    }

    #[test]
    fn test_no_match_is_new_album() {
        let catalog = vec![summary(1, "Album", "Other Band", None)];
        let candidate = mock_combo("Album", "Band", 3);
        assert!(resolve_local_identity(&candidate, &catalog).is_none());

        // Missing ids never match each other
        let catalog = vec![summary(1, "Different", "Band", None)];
        assert!(resolve_local_identity(&candidate, &catalog).is_none());
    }
}
