//! In-memory shapes produced by the parser: one [`PromptRuntime`] per
//! successfully-parsed document, plus the typed argument schema used to
//! coerce MCP tool-call arguments before rendering.

use std::collections::HashMap;

use serde::Serialize;

use crate::document::{ArgTypeDocument, Visibility};

/// Lifecycle status of a metadata prompt, plus the synthetic `legacy` value
/// assigned to documents without metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// In-progress, not recommended for general use.
    Draft,
    /// Generally available.
    Stable,
    /// Superseded; still parseable but discouraged.
    Deprecated,
    /// No metadata block was present.
    Legacy,
}

impl Status {
    /// Numeric rank used by the priority ranker: higher wins.
    pub fn rank(self) -> u8 {
        match self {
            Status::Stable => 4,
            Status::Draft => 3,
            Status::Deprecated => 2,
            Status::Legacy => 1,
        }
    }

    /// Parse a document's `status` string, case-sensitively per the enum.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Status::Draft),
            "stable" => Some(Status::Stable),
            "deprecated" => Some(Status::Deprecated),
            _ => None,
        }
    }
}

/// Where a `PromptRuntime`'s classification ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `registry.yaml` overlaid this entry.
    Registry,
    /// A well-formed metadata block.
    Embedded,
    /// No metadata block.
    Legacy,
}

impl SourceKind {
    /// Numeric rank used by the priority ranker: higher wins.
    pub fn rank(self) -> u8 {
        match self {
            SourceKind::Registry => 3,
            SourceKind::Embedded => 2,
            SourceKind::Legacy => 1,
        }
    }
}

/// Whether a runtime entry is currently tool-registered, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStateKind {
    /// Tool-registered; a well-formed metadata prompt.
    Active,
    /// Tool-registered; a legacy (metadata-less) prompt.
    Legacy,
    /// Failed structural validation; never tool-registered.
    Invalid,
    /// Registry-marked `deprecated: true`; never tool-registered.
    Disabled,
    /// Metadata present-but-invalid, or an undeclared partial reference.
    Warning,
}

impl RuntimeStateKind {
    /// Whether this state is exposed as a tool.
    pub fn is_registered(self) -> bool {
        matches!(self, RuntimeStateKind::Active | RuntimeStateKind::Legacy)
    }
}

/// A parsed, semver-shaped version, compared component-by-component with
/// missing trailing components treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl Version {
    /// The implicit version of a document with no `version` field.
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
    };

    /// Parse a `MAJOR.MINOR.PATCH`-shaped string; missing components are
    /// zero-filled, non-numeric components fail.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        Some(Version { major, minor, patch })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Coerced, introspectable shape of one `args` entry.
#[derive(Debug, Clone, Serialize)]
pub struct ArgSchema {
    /// Declared value kind.
    pub arg_type: ArgTypeDocument,
    /// Description, if any.
    pub description: Option<String>,
    /// Default value applied when the argument is omitted and optional.
    pub default: Option<serde_json::Value>,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// One in-memory record produced by a reload pass.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRuntime {
    /// Globally unique identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Parsed or implicit version.
    pub version: Version,
    /// Lifecycle status.
    pub status: Status,
    /// Free-text tags.
    pub tags: Vec<String>,
    /// Free-text use-case descriptions.
    pub use_cases: Vec<String>,
    /// Current registration state.
    pub runtime_state: RuntimeStateKind,
    /// Classification source.
    pub source: SourceKind,
    /// First path segment under the root, or `root`.
    pub group: String,
    /// Registry-overlaid visibility, if any.
    pub visibility: Option<Visibility>,
    /// Absolute path of the originating document.
    #[serde(skip)]
    pub file_path: std::path::PathBuf,
    /// Coerced argument schema, keyed by argument name.
    #[serde(skip)]
    pub args: HashMap<String, ArgSchema>,
    /// Human-readable diagnostics accumulated while classifying (e.g.
    /// undeclared partials, invalid metadata). Non-fatal.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_partial_components_as_zero() {
        assert_eq!(Version::parse("1.2.3"), Some(Version { major: 1, minor: 2, patch: 3 }));
        assert_eq!(Version::parse("1.2"), Some(Version { major: 1, minor: 2, patch: 0 }));
        assert_eq!(Version::parse("1"), Some(Version { major: 1, minor: 0, patch: 0 }));
        assert_eq!(Version::parse("1.2.3.4"), None);
        assert_eq!(Version::parse("abc"), None);
    }

    #[test]
    fn version_ordering_is_numeric_not_lexicographic() {
        assert!(Version::parse("1.9.0").unwrap() < Version::parse("1.10.0").unwrap());
    }

    #[test]
    fn status_rank_orders_stable_highest() {
        assert!(Status::Stable.rank() > Status::Draft.rank());
        assert!(Status::Draft.rank() > Status::Deprecated.rank());
        assert!(Status::Deprecated.rank() > Status::Legacy.rank());
    }
}
