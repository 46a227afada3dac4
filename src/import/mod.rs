//! Import queue processor.
//!
//! User-requested imports are queued and processed strictly one at a time
//! in enqueue order. Each job converts its source into a combo, optionally
//! links a playable streaming match, reuses an existing album when one
//! already carries the same identity, and persists atomically. Enrichment
//! of the stored album runs afterwards as a detached task.

mod job;
mod pipeline;
mod queue;

pub use job::{ImportBatch, ImportJob, ImportProgress, ImportRequest, ImportSource, JobStatus};
pub use pipeline::ImportPipeline;
pub use queue::ImportQueue;

use crate::sources::SourceError;

/// Why an import job failed.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The backend result could not become a canonical combo
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// No streaming playlist cleared the confidence cutoff
    #[error("no match found")]
    NoMatchFound,

    /// The playable-match search itself failed
    #[error("playable match failed: {0}")]
    Matching(SourceError),

    /// The catalog transaction failed
    #[error("persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<SourceError> for ImportError {
    fn from(e: SourceError) -> Self {
        Self::Conversion(e.to_string())
    }
}
