//! Adapter layer: Convert Last.fm DTOs to domain models

use super::dto;
use crate::sources::domain::{ScrobbleAlbum, ScrobbleAlbumSummary, ScrobbleTrack};

/// Preferred image sizes, largest first
const IMAGE_SIZES: [&str; 4] = ["mega", "extralarge", "large", "medium"];

pub fn to_summary(album: dto::AlbumMatch) -> ScrobbleAlbumSummary {
    ScrobbleAlbumSummary {
        title: album.name,
        artist: album.artist,
        url: album.url,
    }
}

pub fn to_album(info: dto::AlbumInfo) -> ScrobbleAlbum {
    let tracks = info
        .tracks
        .map(|t| t.track.into_vec())
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, track)| ScrobbleTrack {
            title: track.name,
            url: track.url,
            position: Some(track.attr.map_or(index as u32 + 1, |a| a.rank)),
            duration_ms: track.duration.filter(|d| *d > 0).map(|d| d * 1000),
        })
        .collect();

    ScrobbleAlbum {
        title: info.name,
        artist: info.artist,
        url: info.url,
        musicbrainz_release_id: info.mbid.filter(|id| !id.is_empty()),
        image: best_image(&info.image),
        tags: info
            .tags
            .into_vec()
            .into_iter()
            .flat_map(|t| t.tag.into_vec())
            .map(|t| t.name.to_lowercase())
            .collect(),
        tracks,
    }
}

fn best_image(images: &[dto::Image]) -> Option<String> {
    IMAGE_SIZES.iter().find_map(|size| {
        images
            .iter()
            .find(|img| img.size == *size && !img.url.is_empty())
            .map(|img| img.url.clone())
    })
}
