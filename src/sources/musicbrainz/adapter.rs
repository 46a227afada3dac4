//! Adapter layer: Convert MusicBrainz DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! This isolates API changes - if MusicBrainz changes their response format,
//! only this file and dto.rs need to change.

use super::dto;
use crate::model::{ArtistCredit, ArtistCredits, join_credits};
use crate::sources::domain::{Release, ReleaseSummary, ReleaseTrack};

/// Convert a search hit to a release summary
pub fn to_summary(hit: dto::ReleaseHit) -> ReleaseSummary {
    ReleaseSummary {
        artist: join_credits(&to_credits(&hit.artist_credit)),
        id: hit.id,
        title: hit.title,
        track_count: hit.track_count,
        score: hit.score,
    }
}

/// Convert a release lookup into a domain release
pub fn to_release(response: dto::ReleaseResponse) -> Release {
    let artists = to_credits(&response.artist_credit);
    let multi_disc = response.media.len() > 1;

    let tracks = response
        .media
        .iter()
        .flat_map(|medium| {
            let disc = medium.position.filter(|_| multi_disc).or(Some(1));
            medium.tracks.iter().map(move |track| to_track(track, disc))
        })
        .collect();

    let year = parse_year(response.date.as_deref()).or_else(|| {
        response
            .release_group
            .as_ref()
            .and_then(|rg| parse_year(rg.first_release_date.as_deref()))
    });

    Release {
        id: response.id,
        release_group_id: response.release_group.map(|rg| rg.id),
        title: response.title,
        artists,
        year,
        tracks,
        genres: extract_genres(&response.genres),
    }
}

fn to_track(track: &dto::Track, disc_number: Option<u32>) -> ReleaseTrack {
    let recording = track.recording.as_ref();
    // Track-level credit overrides the recording credit when present
    let artists = match (&track.artist_credit, recording) {
        (Some(credits), _) => to_credits(credits),
        (None, Some(rec)) => to_credits(&rec.artist_credit),
        (None, None) => ArtistCredits::new(),
    };

    ReleaseTrack {
        recording_id: recording.map(|r| r.id.clone()),
        title: track
            .title
            .clone()
            .or_else(|| recording.map(|r| r.title.clone()))
            .unwrap_or_default(),
        position: track.position,
        disc_number,
        duration_ms: track.length.or_else(|| recording.and_then(|r| r.length)),
        artists,
    }
}

/// Convert MusicBrainz artist credits, preferring the credited name
pub fn to_credits(credits: &[dto::ArtistCredit]) -> ArtistCredits {
    credits
        .iter()
        .map(|credit| ArtistCredit {
            artist_id: None,
            name: credit
                .name
                .clone()
                .unwrap_or_else(|| credit.artist.name.clone()),
            musicbrainz_id: Some(credit.artist.id.clone()),
            join_phrase: credit.joinphrase.clone().unwrap_or_default(),
        })
        .collect()
}

/// Parse year from date (YYYY, YYYY-MM, or YYYY-MM-DD)
fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next())
        .and_then(|y| y.parse().ok())
}

/// Genres sorted by vote count (most popular first), zero-vote entries dropped
fn extract_genres(genres: &[dto::Genre]) -> Vec<String> {
    let mut sorted: Vec<_> = genres.iter().filter(|g| g.count > 0).collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted.into_iter().map(|g| g.name.clone()).collect()
}

/// Parse the plain-text `/genre/all?fmt=txt` listing: one genre per line
pub fn parse_genre_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
