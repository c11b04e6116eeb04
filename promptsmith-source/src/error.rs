//! Source-layer errors.

use thiserror::Error;

/// Result alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised by [`crate::Source::sync`] and [`crate::SourceManager`].
#[derive(Error, Debug)]
pub enum SourceError {
    /// A source's `sync` failed (after any internal retries).
    #[error("sync failed for '{url}': {message}")]
    Sync {
        /// The source identifier.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// All user sources failed to load at startup.
    #[error("no source loaded; attempts: {}", .0.iter().map(|(u, m)| format!("{u}: {m}")).collect::<Vec<_>>().join("; "))]
    AllSourcesFailed(Vec<(String, String)>),

    /// Generic I/O failure during mirroring or watching.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
