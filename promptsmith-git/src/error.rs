//! Git-specific error types, following `swissarmyhammer-git::error`'s shape
//! of a `convert_git2_error(operation, source)` constructor per failure site.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Errors raised by [`crate::sync_repo`] and [`crate::fetch_remote_head`].
#[derive(Debug, Error)]
pub enum GitError {
    /// A `git2` call failed.
    #[error("git operation '{operation}' failed: {source}")]
    Git2 {
        /// The high-level operation being attempted (`clone`, `fetch`, ...).
        operation: String,
        /// The underlying git2 error.
        #[source]
        source: git2::Error,
    },

    /// The target directory exists but does not hold a usable repository and
    /// cloning over it is unsafe.
    #[error("'{path}' exists and is not a git repository")]
    NotARepository {
        /// The offending path.
        path: PathBuf,
    },

    /// All sync retries were exhausted.
    #[error("sync of '{url}' failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// The URL being synced.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed.
        last_error: String,
    },
}

/// Wrap a `git2::Error` with the operation name that produced it.
pub fn convert_git2_error(operation: &str, source: git2::Error) -> GitError {
    GitError::Git2 {
        operation: operation.to_string(),
        source,
    }
}
