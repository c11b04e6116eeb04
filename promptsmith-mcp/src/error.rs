//! Errors raised by the reload engine and the control surface.

use thiserror::Error;

/// Result alias for promptsmith-mcp operations.
pub type Result<T> = std::result::Result<T, McpServerError>;

/// Errors the `ReloadEngine` and control-surface tools can raise.
#[derive(Error, Debug)]
pub enum McpServerError {
    /// Syncing the active (or system) source failed; the previous tool set
    /// is preserved.
    #[error("sync failed: {0}")]
    Sync(#[from] promptsmith_source::SourceError),

    /// The partial registry could not be rebuilt (e.g. unreadable directory).
    #[error("partial registry rebuild failed: {0}")]
    PartialRebuild(String),

    /// `inspect`/`switch_source` targeting a missing id.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<McpServerError> for rmcp::ErrorData {
    fn from(err: McpServerError) -> Self {
        match err {
            McpServerError::NotFound(id) => rmcp::ErrorData::resource_not_found(id, None),
            other => rmcp::ErrorData::internal_error(other.to_string(), None),
        }
    }
}
