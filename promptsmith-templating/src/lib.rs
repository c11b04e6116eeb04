//! # promptsmith-templating
//!
//! An opaque `compile(source) -> render(ctx) -> text` template engine, plus
//! the global [`partials::PartialRegistry`] of named `.hbs` fragments that
//! templates may reference with `{{> name }}`.

pub mod engine;
pub mod error;
pub mod partials;

pub use engine::{CompiledTemplate, TemplateEngine};
pub use error::{Result, TemplateError};
pub use partials::{extract_partial_refs, normalize_partial_name, PartialRegistry};
