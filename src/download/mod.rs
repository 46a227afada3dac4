//! Download task scheduler.
//!
//! Track downloads run concurrently under one global ceiling. Every
//! requested track becomes a [`DownloadTask`] immediately; the first
//! `Created` task is started whenever a slot is free, re-checked on every
//! state transition. Album downloads aggregate their tasks and report once
//! all of them are terminal.
//!
//! - [`layout`]: directory and file naming of downloaded albums
//! - [`task`]: task states and counts
//! - [`scheduler`]: the scheduler service

pub mod layout;
mod scheduler;
mod task;

pub use scheduler::DownloadScheduler;
pub use task::{DownloadTask, SchedulerStats, TaskId, TaskState};

use crate::sources::SourceError;

/// Why a single track download failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Catalog row missing
    #[error("{0} not found")]
    NotFound(String),

    /// No streaming source, or already stored locally
    #[error("track {0} is not downloadable")]
    NotDownloadable(i64),

    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("cancelled")]
    Cancelled,
}
