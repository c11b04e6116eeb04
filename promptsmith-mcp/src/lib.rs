//! # promptsmith-mcp
//!
//! The dynamic [`RmcpToolRegistry`], the [`RuntimeStateStore`], the
//! [`ReloadEngine`] that drives reload passes across both, and the
//! [`ServerHandler`](rmcp::ServerHandler) implementation exposing the
//! Control Surface.

pub mod engine;
pub mod error;
pub mod handler;
pub mod registry;
pub mod state;

pub use engine::{GroupConfig, ReloadEngine, ReloadReport, SourceWatchHandle};
pub use error::{McpServerError, Result};
pub use handler::PromptsmithHandler;
pub use registry::{RmcpToolRegistry, ToolFn, ToolHandle};
pub use state::{RuntimeSnapshot, RuntimeStateStore};
