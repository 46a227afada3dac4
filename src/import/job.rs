//! Import jobs, their results and the progress value.

use crate::sources::LocalAlbum;

/// What to import, per backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSource {
    /// A playlist (album page) on the streaming backend
    Streaming { playlist_id: String },
    /// A structured-metadata release
    Release { release_id: String },
    /// An album on the scrobble backend
    Scrobble { artist: String, title: String },
    /// An album found by a local-filesystem scan
    Local(LocalAlbum),
}

impl ImportSource {
    /// Short human-readable label for progress reporting.
    pub fn label(&self) -> String {
        match self {
            Self::Streaming { playlist_id } => format!("playlist {}", playlist_id),
            Self::Release { release_id } => format!("release {}", release_id),
            Self::Scrobble { artist, title } => format!("{} - {}", artist, title),
            Self::Local(album) => format!("{} - {}", album.artist, album.title),
        }
    }
}

/// A request to import one album.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub source: ImportSource,
    /// Also link a playable streaming match before persisting
    pub match_playable: bool,
}

impl ImportRequest {
    pub fn new(source: ImportSource) -> Self {
        Self {
            source,
            match_playable: false,
        }
    }

    pub fn with_playable_match(mut self) -> Self {
        self.match_playable = true;
        self
    }
}

/// Lifecycle of a job inside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Finished,
}

/// One queued import. Mutated only by the queue worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    /// Identity handed back by `enqueue`, stable for the job's lifetime
    pub id: u64,
    pub request: ImportRequest,
    pub status: JobStatus,
    /// Catalog album created or reused, set on success
    pub album_id: Option<i64>,
    /// Reason the job failed, set on failure
    pub error: Option<String>,
}

impl ImportJob {
    pub(crate) fn new(id: u64, request: ImportRequest) -> Self {
        Self {
            id,
            request,
            status: JobStatus::Pending,
            album_id: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }

    pub fn succeeded(&self) -> bool {
        self.is_finished() && self.error.is_none()
    }
}

/// Every job of a drained queue, in enqueue order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBatch {
    pub jobs: Vec<ImportJob>,
}

impl ImportBatch {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs that produced an album.
    pub fn successes(&self) -> impl Iterator<Item = &ImportJob> {
        self.jobs.iter().filter(|j| j.succeeded())
    }

    /// Jobs that failed, with their reason.
    pub fn failures(&self) -> impl Iterator<Item = &ImportJob> {
        self.jobs.iter().filter(|j| !j.succeeded())
    }
}

/// Progress of the queue as shown to the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportProgress {
    /// Label of the job being processed
    pub label: String,
    /// `(finished + current job fraction) / total`, in `0.0..=1.0`
    pub fraction: f32,
    /// False once the queue has drained
    pub active: bool,
}
