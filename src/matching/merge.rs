//! Coalesce merging of albums, tracks and whole combos.
//!
//! Field rule: a present incoming value wins, a missing one never erases a
//! known value. Track lists are reconciled by a [`TrackMergePolicy`] chosen
//! through [`MergeStrategy`].

use serde::{Deserialize, Serialize};

use crate::model::{Album, ArtistCredits, Combo, Track, TrackCombo};

/// Take `incoming` when present, else keep `existing`.
fn prefer<T: Clone>(existing: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        existing.clone_from(incoming);
    }
}

/// Fill `existing` only when it is missing.
fn fill<T: Clone>(existing: &mut Option<T>, incoming: &Option<T>) {
    if existing.is_none() {
        existing.clone_from(incoming);
    }
}

fn prefer_text(existing: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() {
        *existing = incoming.to_string();
    }
}

/// Field-level merge of two values describing the same entity.
pub trait Coalesce {
    /// Merge `incoming` into `self`, preferring present incoming values.
    fn coalesce(&mut self, incoming: &Self);

    /// Fill only the fields `self` is missing.
    fn fill_missing(&mut self, other: &Self);
}

/// Catalog state (row id, library and lifecycle flags) always stays with
/// `self`; only descriptive facts are merged.
impl Coalesce for Album {
    fn coalesce(&mut self, incoming: &Self) {
        fill(&mut self.id, &incoming.id);
        prefer_text(&mut self.title, &incoming.title);
        prefer(&mut self.musicbrainz_release_id, &incoming.musicbrainz_release_id);
        prefer(
            &mut self.musicbrainz_release_group_id,
            &incoming.musicbrainz_release_group_id,
        );
        prefer(&mut self.playlist, &incoming.playlist);
        prefer(&mut self.artwork_uri, &incoming.artwork_uri);
        prefer(&mut self.local_artwork_uri, &incoming.local_artwork_uri);
        prefer(&mut self.year, &incoming.year);
        self.in_library |= incoming.in_library;
        self.is_local |= incoming.is_local;
    }

    fn fill_missing(&mut self, other: &Self) {
        fill(&mut self.id, &other.id);
        if self.title.trim().is_empty() {
            self.title.clone_from(&other.title);
        }
        fill(&mut self.musicbrainz_release_id, &other.musicbrainz_release_id);
        fill(
            &mut self.musicbrainz_release_group_id,
            &other.musicbrainz_release_group_id,
        );
        fill(&mut self.playlist, &other.playlist);
        fill(&mut self.artwork_uri, &other.artwork_uri);
        fill(&mut self.local_artwork_uri, &other.local_artwork_uri);
        fill(&mut self.year, &other.year);
        self.in_library |= other.in_library;
        self.is_local |= other.is_local;
    }
}

impl Coalesce for Track {
    fn coalesce(&mut self, incoming: &Self) {
        fill(&mut self.id, &incoming.id);
        fill(&mut self.album_id, &incoming.album_id);
        prefer_text(&mut self.title, &incoming.title);
        prefer(&mut self.album_position, &incoming.album_position);
        prefer(&mut self.disc_number, &incoming.disc_number);
        prefer(&mut self.year, &incoming.year);
        prefer(&mut self.local_uri, &incoming.local_uri);
        prefer(&mut self.stream, &incoming.stream);
        prefer(&mut self.musicbrainz_id, &incoming.musicbrainz_id);
        prefer(&mut self.scrobble_id, &incoming.scrobble_id);
        prefer(&mut self.duration_ms, &incoming.duration_ms);
        self.play_count = self.play_count.max(incoming.play_count);
        self.in_library |= incoming.in_library;
    }

    fn fill_missing(&mut self, other: &Self) {
        fill(&mut self.id, &other.id);
        fill(&mut self.album_id, &other.album_id);
        if self.title.trim().is_empty() {
            self.title.clone_from(&other.title);
        }
        fill(&mut self.album_position, &other.album_position);
        fill(&mut self.disc_number, &other.disc_number);
        fill(&mut self.year, &other.year);
        fill(&mut self.local_uri, &other.local_uri);
        fill(&mut self.stream, &other.stream);
        fill(&mut self.musicbrainz_id, &other.musicbrainz_id);
        fill(&mut self.scrobble_id, &other.scrobble_id);
        fill(&mut self.duration_ms, &other.duration_ms);
        self.play_count = self.play_count.max(other.play_count);
        self.in_library |= other.in_library;
    }
}

/// Incoming credits replace existing ones when non-empty.
fn coalesce_credits(existing: &mut ArtistCredits, incoming: &ArtistCredits) {
    if !incoming.is_empty() {
        existing.clone_from(incoming);
    }
}

/// Key used to pair two tracks: `(disc, position)` when positioned.
fn position_key(track: &Track) -> Option<(u32, u32)> {
    track
        .album_position
        .map(|p| (track.disc_number.unwrap_or(1), p))
}

fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Pair each `left` track with an unused `right` track.
///
/// Position match first, normalized title second. Returns, per left track,
/// the index of its partner in `right`.
fn pair_tracks(left: &[TrackCombo], right: &[TrackCombo]) -> Vec<Option<usize>> {
    let mut used = vec![false; right.len()];
    let mut pairs = vec![None; left.len()];

    for (i, l) in left.iter().enumerate() {
        let Some(key) = position_key(&l.track) else {
            continue;
        };
        if let Some(j) = (0..right.len()).find(|&j| !used[j] && position_key(&right[j].track) == Some(key)) {
            used[j] = true;
            pairs[i] = Some(j);
        }
    }

    for (i, l) in left.iter().enumerate() {
        if pairs[i].is_some() {
            continue;
        }
        let title = normalize_title(&l.track.title);
        if title.is_empty() {
            continue;
        }
        if let Some(j) = (0..right.len())
            .find(|&j| !used[j] && normalize_title(&right[j].track.title) == title)
        {
            used[j] = true;
            pairs[i] = Some(j);
        }
    }

    pairs
}

/// Merge a paired track: existing values win, gaps are filled from incoming.
fn merge_paired(existing: &TrackCombo, incoming: &TrackCombo) -> TrackCombo {
    let mut merged = existing.clone();
    merged.track.fill_missing(&incoming.track);
    if merged.artists.is_empty() {
        merged.artists.clone_from(&incoming.artists);
    }
    merged
}

/// Strip catalog identity so the track is inserted as a new row.
fn detached(entry: &TrackCombo) -> TrackCombo {
    let mut entry = entry.clone();
    entry.track.id = None;
    entry.track.album_id = None;
    entry
}

/// Track-level reconciliation between an existing and a fetched tracklist.
pub trait TrackMergePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn merge_tracks(&self, existing: &[TrackCombo], incoming: &[TrackCombo]) -> Vec<TrackCombo>;
}

/// Keep every existing track and value; fill gaps and append new tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepSelf;

impl TrackMergePolicy for KeepSelf {
    fn name(&self) -> &'static str {
        "keep_self"
    }

    fn merge_tracks(&self, existing: &[TrackCombo], incoming: &[TrackCombo]) -> Vec<TrackCombo> {
        let pairs = pair_tracks(existing, incoming);
        let mut merged: Vec<TrackCombo> = existing
            .iter()
            .zip(&pairs)
            .map(|(e, pair)| match pair {
                Some(j) => merge_paired(e, &incoming[*j]),
                None => e.clone(),
            })
            .collect();

        let mut paired = vec![false; incoming.len()];
        for j in pairs.iter().flatten() {
            paired[*j] = true;
        }
        merged.extend(
            incoming
                .iter()
                .zip(paired)
                .filter(|(_, p)| !p)
                .map(|(entry, _)| detached(entry)),
        );
        merged
    }
}

/// Keep the shorter tracklist as the skeleton.
///
/// Paired tracks are merged with existing values winning. Tracks of the
/// longer list without a partner are dropped. On equal length the existing
/// list is the skeleton.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLeast;

impl TrackMergePolicy for KeepLeast {
    fn name(&self) -> &'static str {
        "keep_least"
    }

    fn merge_tracks(&self, existing: &[TrackCombo], incoming: &[TrackCombo]) -> Vec<TrackCombo> {
        if existing.len() <= incoming.len() {
            let pairs = pair_tracks(existing, incoming);
            existing
                .iter()
                .zip(pairs)
                .map(|(e, pair)| match pair {
                    Some(j) => merge_paired(e, &incoming[j]),
                    None => e.clone(),
                })
                .collect()
        } else {
            let pairs = pair_tracks(incoming, existing);
            incoming
                .iter()
                .zip(pairs)
                .map(|(i, pair)| match pair {
                    Some(j) => merge_paired(&existing[j], i),
                    None => detached(i),
                })
                .collect()
        }
    }
}

/// Named track merge policy, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    KeepSelf,
    KeepLeast,
}

impl MergeStrategy {
    pub fn policy(self) -> &'static dyn TrackMergePolicy {
        match self {
            Self::KeepSelf => &KeepSelf,
            Self::KeepLeast => &KeepLeast,
        }
    }
}

/// Merge `incoming` into `existing`.
///
/// Album fields and credits coalesce, tags are unioned in order, and tracks
/// go through `policy`.
pub fn merge_combo(existing: &mut Combo, incoming: &Combo, policy: &dyn TrackMergePolicy) {
    existing.album.coalesce(&incoming.album);
    coalesce_credits(&mut existing.artists, &incoming.artists);
    for tag in &incoming.tags {
        if !existing.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            existing.tags.push(tag.clone());
        }
    }
    existing.tracks = policy.merge_tracks(&existing.tracks, &incoming.tracks);
}
