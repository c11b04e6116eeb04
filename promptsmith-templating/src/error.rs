//! Errors raised by the template engine.

use thiserror::Error;

/// Result alias for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors raised while compiling or rendering a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template body failed to compile.
    #[error("template compile error: {0}")]
    Compile(String),

    /// Rendering a compiled template failed (e.g. a type mismatch in context).
    #[error("template render error: {0}")]
    Render(String),
}
