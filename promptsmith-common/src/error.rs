//! Error taxonomy shared across promptsmith crates.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for promptsmith-common operations.
pub type Result<T> = std::result::Result<T, PromptsmithError>;

/// The error taxonomy described by the reload/parse pipeline.
///
/// Every variant here maps 1:1 onto the taxonomy enumerated by the reload
/// engine's error-handling design: sync/config failures are fatal at the
/// boundary that raises them, parse/schema/compile failures are collected
/// per-document and never abort a reload.
#[derive(Error, Debug)]
pub enum PromptsmithError {
    /// Missing or malformed configuration; fatal at startup.
    #[error("configuration error: {message}")]
    Config {
        /// Description of what was misconfigured.
        message: String,
    },

    /// Source sync failed after exhausting retries.
    #[error("sync failed for source '{source_id}': {message}")]
    Sync {
        /// The source identifier (URL or path) that failed.
        source_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Generic filesystem failure during scan or read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the I/O failure.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// YAML body was not well-formed.
    #[error("parse error in {path}: {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Description of the parse failure.
        message: String,
    },

    /// Document structure violates the prompt-document schema.
    #[error("schema error in {path}: {fields:?}")]
    Schema {
        /// File that failed schema validation.
        path: PathBuf,
        /// Field paths that were invalid.
        fields: Vec<String>,
    },

    /// Metadata fields present but ill-formed; demotes to `warning`, not fatal.
    #[error("metadata error in {path}: {message}")]
    Metadata {
        /// File whose metadata block was ill-formed.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Template body rejected by the template engine.
    #[error("compile error in {path}: {message}")]
    Compile {
        /// File whose template body failed to compile.
        path: PathBuf,
        /// Description of the compile failure.
        message: String,
    },

    /// `registry.yaml` ill-formed; treated as absent, logged at warn.
    #[error("registry error: {message}")]
    Registry {
        /// Description of the registry parse failure.
        message: String,
    },

    /// `inspect`/`switch_source` targeting a missing id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate id encountered during single-file reload.
    #[error("conflict for id '{0}'")]
    Conflict(String),

    /// Catch-all for conditions that don't fit the taxonomy above.
    #[error("{message}")]
    Other {
        /// Custom error message.
        message: String,
    },
}

impl PromptsmithError {
    /// Build an [`PromptsmithError::Io`] from a path and an underlying error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an [`PromptsmithError::Other`] with a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}
