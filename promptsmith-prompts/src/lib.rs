//! # promptsmith-prompts
//!
//! Prompt document schema, the parse/validate/classify/compile pipeline,
//! group filtering, and the priority ranker that resolves duplicate ids.

pub mod args;
pub mod document;
pub mod error;
pub mod group;
pub mod parser;
pub mod rank;
pub mod runtime;

pub use args::{build_arg_schemas, coerce_value};
pub use document::{
    ArgDocument, ArgTypeDocument, DependenciesDocument, PromptDocument, RegistryEntry,
    RegistryFile, TriggersDocument, Visibility, EXCLUDED_BASENAMES,
};
pub use error::{DocumentFailure, PromptError, Result};
pub use parser::{is_candidate, parse_document, ParseContext, ParseOutcome};
pub use rank::{cmp_priority, dedupe_by_id, rank};
pub use runtime::{ArgSchema, PromptRuntime, RuntimeStateKind, SourceKind, Status, Version};
