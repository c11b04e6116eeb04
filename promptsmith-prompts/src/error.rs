//! Errors raised while parsing, validating, and ranking prompt documents.

use thiserror::Error;

/// Result alias for the prompt pipeline.
pub type Result<T> = std::result::Result<T, PromptError>;

/// A failure classified while processing one document. Unlike
/// [`PromptError`], which propagates, these are collected into a reload's
/// error list and never abort the pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentFailure {
    /// The YAML body did not parse, or failed structural validation.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The template body failed to compile.
    #[error("template compile failure: {0}")]
    CompileFailure(String),
}

/// Errors that can abort a whole parsing or ranking operation.
#[derive(Error, Debug)]
pub enum PromptError {
    /// I/O failure reading a document or registry file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
