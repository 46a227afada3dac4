//! Outcome of one reconciliation pass.

use crate::db::LocalRepair;
use crate::error::Error;

/// What a reconciliation pass changed, and which steps failed.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Genre names newly added to the tag vocabulary
    pub genres_added: u64,
    /// Local albums handed to the import queue
    pub imports_queued: usize,
    pub local: LocalRepair,
    pub playlist_links_removed: u64,
    pub temp_tracks_removed: u64,
    pub temp_albums_removed: u64,
    /// Soft-deleted albums purged with their files
    pub albums_purged: usize,
    pub files_removed: usize,
    /// One entry per failed step (or per album that could not be purged)
    pub failures: Vec<Error>,
}

impl GcReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the steps that failed, in order.
    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.failures
            .iter()
            .filter_map(|e| match e {
                Error::Reconciliation { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub(super) fn record(&mut self, step: &'static str, error: impl std::fmt::Display) {
        tracing::warn!(target: "reconcile", step, error = %error, "Reconciliation step failed");
        self.failures.push(Error::reconciliation(step, error.to_string()));
    }
}

impl std::fmt::Display for GcReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "genres added:            {}", self.genres_added)?;
        writeln!(f, "local imports queued:    {}", self.imports_queued)?;
        writeln!(f, "broken files cleared:    {}", self.local.cleared_references)?;
        writeln!(f, "duplicate tracks:        {}", self.local.duplicates_removed)?;
        writeln!(f, "albums no longer local:  {}", self.local.albums_unflagged)?;
        writeln!(f, "orphan playlist links:   {}", self.playlist_links_removed)?;
        writeln!(
            f,
            "temp rows:               {} tracks, {} albums",
            self.temp_tracks_removed, self.temp_albums_removed
        )?;
        write!(
            f,
            "deleted albums purged:   {} ({} files)",
            self.albums_purged, self.files_removed
        )?;
        for failure in &self.failures {
            write!(f, "\n  ! {}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_steps_in_order() {
        let mut report = GcReport::default();
        assert!(report.is_clean());

        report.record("sync_genres", "rate limited");
        report.record("purge_deleted", "permission denied");
        assert!(!report.is_clean());
        assert_eq!(report.failed_steps(), vec!["sync_genres", "purge_deleted"]);
        assert!(report.to_string().contains("permission denied"));
    }
}
