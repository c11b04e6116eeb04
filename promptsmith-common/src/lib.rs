//! # promptsmith-common
//!
//! Foundational types shared across the promptsmith workspace: the error
//! taxonomy used by the reload pipeline, and the TTL'd [`FileCache`] consumed
//! by the source and prompt-parsing crates.

pub mod error;
pub mod file_cache;

pub use error::{PromptsmithError, Result};
pub use file_cache::{FileCache, SweepHandle};
