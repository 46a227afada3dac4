//! Conversions from backend shapes into canonical [`Combo`]s.
//!
//! Every backend result becomes a Combo here and nowhere else. Cross-source
//! ids are only ever copied from what the backend returned.

use crate::model::{
    Album, ArtistCredit, ArtistCredits, Combo, PlaylistRef, StreamSource, Track, TrackCombo,
};

use super::domain::{LocalAlbum, Release, RemotePlaylist, RemoteTrack, ScrobbleAlbum};

fn single_credit(name: &str) -> ArtistCredits {
    let mut credits = ArtistCredits::new();
    if !name.trim().is_empty() {
        credits.push(ArtistCredit::named(name.trim()));
    }
    credits
}

fn stream_of(item: &RemoteTrack) -> StreamSource {
    StreamSource {
        id: item.id.clone(),
        url: item.url.clone(),
        thumbnail: item.thumbnail.clone(),
    }
}

/// Structured-metadata release to Combo
pub fn combo_from_release(release: &Release) -> Combo {
    let album = Album {
        musicbrainz_release_id: Some(release.id.clone()),
        musicbrainz_release_group_id: release.release_group_id.clone(),
        year: release.year,
        ..Album::new(&release.title)
    };

    let tracks = release
        .tracks
        .iter()
        .map(|t| TrackCombo {
            track: Track {
                album_position: t.position,
                disc_number: t.disc_number,
                year: release.year,
                musicbrainz_id: t.recording_id.clone(),
                duration_ms: t.duration_ms,
                ..Track::new(&t.title)
            },
            artists: if t.artists.is_empty() {
                release.artists.clone()
            } else {
                t.artists.clone()
            },
        })
        .collect();

    Combo {
        album,
        artists: release.artists.clone(),
        tracks,
        tags: release.genres.clone(),
    }
}

/// Streaming playlist to Combo; tracks are numbered in playlist order
pub fn combo_from_playlist(playlist: &RemotePlaylist) -> Combo {
    let artists = single_credit(&playlist.artist);
    let album = Album {
        playlist: Some(PlaylistRef {
            id: playlist.id.clone(),
            browse_id: playlist.browse_id.clone(),
        }),
        artwork_uri: playlist.thumbnail.clone(),
        ..Album::new(&playlist.title)
    };

    let tracks = playlist
        .tracks
        .iter()
        .zip(1u32..)
        .map(|(item, position)| TrackCombo {
            track: Track {
                album_position: Some(position),
                disc_number: Some(1),
                duration_ms: item.duration_ms,
                stream: Some(stream_of(item)),
                ..Track::new(&item.title)
            },
            artists: artists.clone(),
        })
        .collect();

    Combo {
        album,
        artists,
        tracks,
        tags: Vec::new(),
    }
}

/// Scrobble-backend album to Combo
pub fn combo_from_scrobble(scrobbled: &ScrobbleAlbum) -> Combo {
    let artists = single_credit(&scrobbled.artist);
    let album = Album {
        musicbrainz_release_id: scrobbled.musicbrainz_release_id.clone(),
        artwork_uri: scrobbled.image.clone(),
        ..Album::new(&scrobbled.title)
    };

    let tracks = scrobbled
        .tracks
        .iter()
        .map(|t| TrackCombo {
            track: Track {
                album_position: t.position,
                disc_number: Some(1),
                duration_ms: t.duration_ms,
                scrobble_id: t.url.clone(),
                ..Track::new(&t.title)
            },
            artists: artists.clone(),
        })
        .collect();

    Combo {
        album,
        artists,
        tracks,
        tags: scrobbled.tags.clone(),
    }
}

/// Local album to Combo; every track references its file
pub fn combo_from_local(local: &LocalAlbum) -> Combo {
    let album = Album {
        is_local: !local.tracks.is_empty(),
        musicbrainz_release_id: local.release_id.clone(),
        year: local.year,
        ..Album::new(&local.title)
    };

    let tracks = local
        .tracks
        .iter()
        .map(|t| TrackCombo {
            track: Track {
                album_position: t.position,
                disc_number: t.disc_number,
                year: t.year,
                local_uri: Some(t.path.to_string_lossy().into_owned()),
                musicbrainz_id: t.recording_id.clone(),
                duration_ms: t.duration_ms,
                ..Track::new(&t.title)
            },
            artists: single_credit(&t.artist),
        })
        .collect();

    Combo {
        album,
        artists: single_credit(&local.artist),
        tracks,
        tags: Vec::new(),
    }
}

/// Link an accepted playable match to a combo.
///
/// Sets the album's playlist descriptor and assigns stream descriptors to
/// tracks positionally. Known values are left untouched.
pub fn attach_playlist(combo: &mut Combo, playlist: &RemotePlaylist) {
    combo.album.playlist.get_or_insert_with(|| PlaylistRef {
        id: playlist.id.clone(),
        browse_id: playlist.browse_id.clone(),
    });
    if combo.album.artwork_uri.is_none() {
        combo.album.artwork_uri = playlist.thumbnail.clone();
    }
    for (track, item) in combo.tracks_mut().zip(&playlist.tracks) {
        if track.stream.is_none() {
            track.stream = Some(stream_of(item));
        }
        if track.duration_ms.is_none() {
            track.duration_ms = item.duration_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::domain::{LocalTrack, ReleaseTrack, ScrobbleTrack};
    use crate::test_utils::{mock_combo, mock_playlist};
    use std::path::PathBuf;

    #[test]
    fn test_release_conversion_keeps_ids_and_genres() {
        let mut artists = ArtistCredits::new();
        artists.push(ArtistCredit::named("Queen"));
        let release = Release {
            id: "rel-1".to_string(),
            release_group_id: Some("rg-1".to_string()),
            title: "Album".to_string(),
            artists,
            year: Some(1975),
            tracks: vec![ReleaseTrack {
                recording_id: Some("rec-1".to_string()),
                title: "Song".to_string(),
                position: Some(1),
                disc_number: Some(1),
                duration_ms: Some(200_000),
                artists: ArtistCredits::new(),
            }],
            genres: vec!["rock".to_string()],
        };

        let combo = combo_from_release(&release);
        assert_eq!(combo.album.musicbrainz_release_id.as_deref(), Some("rel-1"));
        assert_eq!(combo.album.musicbrainz_release_group_id.as_deref(), Some("rg-1"));
        assert!(combo.album.playlist.is_none());
        assert_eq!(combo.tags, vec!["rock"]);
        // Track without its own credit inherits the release credit
        assert_eq!(combo.tracks[0].artists[0].name, "Queen");
        assert_eq!(combo.tracks[0].track.musicbrainz_id.as_deref(), Some("rec-1"));
    }

    #[test]
    fn test_playlist_conversion_numbers_tracks() {
        let combo = combo_from_playlist(&mock_playlist("PL1", "Album", "Band", 3));
        assert_eq!(combo.album.playlist_id(), Some("PL1"));
        assert_eq!(combo.artist_string(), "Band");
        let positions: Vec<_> = combo.tracks.iter().map(|t| t.track.album_position).collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(combo.tracks[2].track.stream_id(), Some("PL1-vid-3"));
        assert!(combo.album.musicbrainz_release_id.is_none());
    }

    #[test]
    fn test_scrobble_conversion() {
        let combo = combo_from_scrobble(&ScrobbleAlbum {
            title: "Album".to_string(),
            artist: "Band".to_string(),
            url: None,
            musicbrainz_release_id: None,
            image: Some("https://img/xl.png".to_string()),
            tags: vec!["indie".to_string()],
            tracks: vec![ScrobbleTrack {
                title: "Song".to_string(),
                url: Some("https://www.last.fm/music/Band/_/Song".to_string()),
                position: Some(1),
                duration_ms: Some(200_000),
            }],
        });
        assert_eq!(combo.album.artwork_uri.as_deref(), Some("https://img/xl.png"));
        assert!(combo.tracks[0].track.scrobble_id.is_some());
        assert!(combo.album.musicbrainz_release_id.is_none());
    }

    #[test]
    fn test_local_conversion_marks_local() {
        let combo = combo_from_local(&LocalAlbum {
            title: "Album".to_string(),
            artist: "Band".to_string(),
            release_id: Some("rel-1".to_string()),
            directory: PathBuf::from("/music/Album"),
            year: Some(2001),
            tracks: vec![LocalTrack {
                path: PathBuf::from("/music/Album/01.flac"),
                title: "Song".to_string(),
                artist: "Band".to_string(),
                position: Some(1),
                ..Default::default()
            }],
        });
        assert!(combo.album.is_local);
        assert_eq!(
            combo.tracks[0].track.local_uri.as_deref(),
            Some("/music/Album/01.flac")
        );
        assert!(combo.tracks[0].track.is_downloaded());
    }

    #[test]
    fn test_attach_playlist_assigns_streams_positionally() {
        let mut combo = mock_combo("Album", "Band", 3);
        combo.tracks[0].track.stream = Some(StreamSource::new("already"));

        attach_playlist(&mut combo, &mock_playlist("PL9", "Album", "Band", 3));

        assert_eq!(combo.album.playlist_id(), Some("PL9"));
        assert_eq!(combo.tracks[0].track.stream_id(), Some("already"));
        assert_eq!(combo.tracks[1].track.stream_id(), Some("PL9-vid-2"));
        assert!(combo.tracks[2].track.is_downloadable());
    }
}
