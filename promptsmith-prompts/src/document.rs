//! On-disk shapes: the prompt document and the repository-root registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of a document's `args` mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct ArgDocument {
    /// Declared value kind.
    #[serde(rename = "type")]
    pub arg_type: ArgTypeDocument,
    /// Free-text description; also consulted for the `optional`/`(required)`
    /// requiredness heuristic.
    pub description: Option<String>,
    /// Default value, as authored (any scalar or array/object).
    pub default: Option<serde_json::Value>,
    /// Explicit requiredness override.
    pub required: Option<bool>,
}

/// The declared kind of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgTypeDocument {
    /// A string value.
    String,
    /// A numeric value.
    Number,
    /// A boolean value.
    Boolean,
}

/// `triggers.patterns`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggersDocument {
    /// Ordered trigger phrases.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// `dependencies.partials`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependenciesDocument {
    /// Partial names this template declares it uses.
    #[serde(default)]
    pub partials: Vec<String>,
}

/// A prompt document as authored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptDocument {
    /// Globally unique identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Trigger keyword block.
    #[serde(default)]
    pub triggers: TriggersDocument,
    /// Ordered usage rules.
    #[serde(default)]
    pub rules: Vec<String>,
    /// Named argument specs.
    #[serde(default)]
    pub args: HashMap<String, ArgDocument>,
    /// The renderer's source body.
    pub template: String,
    /// Semver `MAJOR.MINOR.PATCH`. Presence (with `status`) marks a metadata prompt.
    pub version: Option<String>,
    /// Lifecycle status; presence (with `version`) marks a metadata prompt.
    pub status: Option<String>,
    /// Free-text tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-text use-case descriptions.
    #[serde(default)]
    pub use_cases: Vec<String>,
    /// Declared partial dependencies.
    #[serde(default)]
    pub dependencies: DependenciesDocument,
}

impl PromptDocument {
    /// A document is a metadata prompt iff both `version` and `status` are
    /// present and non-empty; otherwise it is legacy.
    pub fn is_metadata_prompt(&self) -> bool {
        self.version.as_deref().is_some_and(|v| !v.is_empty())
            && self.status.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Minimal structural validation: non-empty `id`, `title`, `template`.
    /// Field-level failures are returned as `(field, reason)` pairs.
    pub fn structural_errors(&self) -> Vec<(String, String)> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push(("id".to_string(), "must not be empty".to_string()));
        }
        if self.title.trim().is_empty() {
            errors.push(("title".to_string(), "must not be empty".to_string()));
        }
        if self.template.trim().is_empty() {
            errors.push(("template".to_string(), "must not be empty".to_string()));
        }
        for pattern in &self.triggers.patterns {
            if pattern.trim().is_empty() {
                errors.push((
                    "triggers.patterns".to_string(),
                    "entries must not be empty".to_string(),
                ));
                break;
            }
        }
        errors
    }
}

/// Declared visibility of a registry-overlaid prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to any client.
    Public,
    /// Visible only within the owning group.
    Private,
    /// Visible to internal tooling only.
    Internal,
}

/// One entry of `registry.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    /// The document id this entry overlays.
    pub id: String,
    /// Overlaid group, if provided.
    pub group: Option<String>,
    /// Overlaid visibility, if provided.
    pub visibility: Option<Visibility>,
    /// Forces `runtime_state` to `disabled` when true.
    #[serde(default)]
    pub deprecated: bool,
}

/// The repository-root `registry.yaml`: a sequence of entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryFile(pub Vec<RegistryEntry>);

impl RegistryFile {
    /// Parse a `registry.yaml` body.
    pub fn parse(source: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(source)
    }

    /// Look up the entry for `id`, if any.
    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.0.iter().find(|e| e.id == id)
    }
}

/// Basenames excluded from parsing even though they may sit under a
/// recognised source root (lockfiles and manifests from other ecosystems
/// that can legitimately live alongside prompt documents).
pub const EXCLUDED_BASENAMES: &[&str] = &[
    "registry.yaml",
    "pnpm-lock.yaml",
    "yarn.lock",
    "package-lock.json",
    "package.json",
    "composer.lock",
    "go.sum",
    "requirements.txt",
    "poetry.lock",
    "pom.xml",
    "build.gradle",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(version: Option<&str>, status: Option<&str>) -> PromptDocument {
        PromptDocument {
            id: "x".to_string(),
            title: "X".to_string(),
            description: None,
            triggers: TriggersDocument::default(),
            rules: Vec::new(),
            args: HashMap::new(),
            template: "body".to_string(),
            version: version.map(str::to_string),
            status: status.map(str::to_string),
            tags: Vec::new(),
            use_cases: Vec::new(),
            dependencies: DependenciesDocument::default(),
        }
    }

    #[test]
    fn metadata_prompt_requires_both_version_and_status() {
        assert!(doc(Some("1.0.0"), Some("stable")).is_metadata_prompt());
        assert!(!doc(Some("1.0.0"), None).is_metadata_prompt());
        assert!(!doc(None, Some("stable")).is_metadata_prompt());
        assert!(!doc(Some(""), Some("")).is_metadata_prompt());
    }

    #[test]
    fn structural_errors_flag_empty_required_fields() {
        let mut document = doc(None, None);
        document.id = String::new();
        let errors = document.structural_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "id");
    }
}
