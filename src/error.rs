//! Crate-level error type.
//!
//! Each component owns a narrow `thiserror` enum ([`SourceError`],
//! [`ImportError`], [`DownloadError`], [`ConfigError`]); [`Error`] wraps them
//! for code that crosses component boundaries, such as enrichment and
//! reconciliation. The CLI converts everything into `anyhow::Error`.
//!
//! [`SourceError`]: crate::sources::SourceError
//! [`ImportError`]: crate::import::ImportError
//! [`DownloadError`]: crate::download::DownloadError
//! [`ConfigError`]: crate::config::ConfigError

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog query or transaction failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Source error: {0}")]
    Source(#[from] crate::sources::SourceError),

    #[error("Import error: {0}")]
    Import(#[from] crate::import::ImportError),

    #[error("Download error: {0}")]
    Download(#[from] crate::download::DownloadError),

    /// A best-effort maintenance step failed
    #[error("Reconciliation step '{step}' failed: {message}")]
    Reconciliation { step: &'static str, message: String },

    /// Catalog row missing
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn reconciliation(step: &'static str, message: impl Into<String>) -> Self {
        Self::Reconciliation {
            step,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Wrap with a description of what was being attempted.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// `.with_context(..)` on crate, io and sqlx results.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_row() {
        let err = Error::not_found("album 42");
        assert_eq!(err.to_string(), "Not found: album 42");
    }

    #[test]
    fn test_reconciliation_error_names_step() {
        let err = Error::reconciliation("purge_deleted", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("purge_deleted"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_context_wraps_source() {
        let err = Error::from(crate::config::ConfigError::NoConfigDir).context("saving settings");
        assert!(err.to_string().starts_with("saving settings: "));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_result_with_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let with_ctx = result.with_context("writing cover.jpg");
        assert!(with_ctx.unwrap_err().to_string().contains("writing cover.jpg"));
    }
}
