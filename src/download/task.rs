//! Download tasks and their lifecycle.

use std::path::PathBuf;

/// Identity of a task inside one scheduler.
pub type TaskId = u64;

/// Lifecycle of a download task. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Queued, waiting for a free slot
    Created,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// One track download, observable from the moment it is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub id: TaskId,
    pub track_id: i64,
    /// Album the task was requested for, if any
    pub album_id: Option<i64>,
    /// Directory the audio file is written into
    pub target_dir: PathBuf,
    pub state: TaskState,
    /// Reason the task failed
    pub error: Option<String>,
    /// Final audio path once succeeded
    pub path: Option<PathBuf>,
}

/// Task counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub created: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl SchedulerStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a DownloadTask>) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            match task.state {
                TaskState::Created => stats.created += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Succeeded => stats.succeeded += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Tasks that have not reached a terminal state yet.
    pub fn active(&self) -> usize {
        self.created + self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: TaskId, state: TaskState) -> DownloadTask {
        DownloadTask {
            id,
            track_id: id as i64,
            album_id: Some(1),
            target_dir: PathBuf::from("/music/Band - Album"),
            state,
            error: None,
            path: None,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Created.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn test_stats_count_states() {
        let tasks = vec![
            task(1, TaskState::Succeeded),
            task(2, TaskState::Running),
            task(3, TaskState::Created),
            task(4, TaskState::Created),
            task(5, TaskState::Failed),
        ];
        let stats = SchedulerStats::from_tasks(&tasks);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.active(), 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 0);
    }
}
