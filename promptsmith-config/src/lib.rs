//! # promptsmith-config
//!
//! The enumerated configuration surface (spec §6), loaded from the process
//! environment over built-in defaults via `figment`.

pub mod error;
pub mod settings;

pub use error::{ConfigError, Result};
pub use settings::{validate_source_url, Language, Settings, SourceSpec, TransportType};
