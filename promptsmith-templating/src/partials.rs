//! Global registry of named template fragments loaded from `.hbs` files.
//!
//! Mirrors the adapter pattern in `swissarmyhammer-prompts::prompt_partial_adapter`
//! (a `PartialLoader`-style lookup keyed by normalized name), specialised to the
//! filesystem-backed `.hbs` source this spec requires rather than a prompt
//! library doubling as a partial source.

use std::path::Path;

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, trace, warn};

/// Matches Handlebars-style partial references: `{{> name }}`.
fn partial_ref_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{>\s*([A-Za-z0-9_\-./]+)\s*\}\}").unwrap())
}

/// Extract the set of partial names referenced by a template body, in the
/// `{{> name }}` form.
pub fn extract_partial_refs(source: &str) -> Vec<String> {
    partial_ref_pattern()
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect()
}

/// Normalize a partial name the way the adapter does: try the name verbatim,
/// then with common suffixes/prefixes stripped, so a single `register` at
/// startup is forgiving of path-like references.
pub fn normalize_partial_name(name: &str) -> Vec<String> {
    let mut candidates = vec![name.to_string()];
    if let Some(stripped) = name.strip_prefix("partials/") {
        candidates.push(stripped.to_string());
    }
    if let Some(stripped) = name.strip_suffix(".hbs") {
        candidates.push(stripped.to_string());
    }
    candidates
}

/// Global, mutable dictionary of named template fragments loaded from `.hbs`
/// files. Rebuilt wholesale on every reload; readers always see either the
/// pre-rebuild or post-rebuild set (callers serialize the rebuild behind the
/// reload lock).
#[derive(Debug, Default)]
pub struct PartialRegistry {
    partials: DashMap<String, String>,
}

impl PartialRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unregister every previously loaded partial.
    pub fn clear(&self) {
        self.partials.clear();
    }

    /// Register a partial under `name`, overwriting any prior definition.
    pub fn register(&self, name: impl Into<String>, body: impl Into<String>) {
        self.partials.insert(name.into(), body.into());
    }

    /// Look up a partial body by name, trying normalized variants.
    pub fn get(&self, name: &str) -> Option<String> {
        for candidate in normalize_partial_name(name) {
            if let Some(body) = self.partials.get(&candidate) {
                return Some(body.clone());
            }
        }
        None
    }

    /// Does a partial (in any normalized form) exist?
    pub fn contains(&self, name: &str) -> bool {
        normalize_partial_name(name)
            .iter()
            .any(|candidate| self.partials.contains_key(candidate))
    }

    /// All registered partial names.
    pub fn names(&self) -> Vec<String> {
        self.partials.iter().map(|e| e.key().clone()).collect()
    }

    /// Scan `root` recursively for `.hbs` files and register each under its
    /// basename without extension. Later-loaded files win on name collision.
    pub fn load_from_dir(&self, root: &Path) -> std::io::Result<usize> {
        let mut count = 0;
        if !root.is_dir() {
            return Ok(0);
        }
        for entry in walkdir::WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(path) {
                Ok(body) => {
                    trace!(name = stem, path = %path.display(), "registering partial");
                    self.register(stem, body);
                    count += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read partial"),
            }
        }
        debug!(root = %root.display(), count, "partial registry rebuilt");
        Ok(count)
    }

    /// Expand `{{> name }}` references in `source` against this registry,
    /// recursively up to `max_depth` levels. Unresolved references are left
    /// untouched (the caller records them as undeclared/unused warnings).
    pub fn expand(&self, source: &str, max_depth: usize) -> String {
        let mut current = source.to_string();
        for _ in 0..max_depth {
            let refs = extract_partial_refs(&current);
            if refs.is_empty() {
                break;
            }
            let mut changed = false;
            for name in refs {
                if let Some(body) = self.get(&name) {
                    let needle = format!("{{{{> {name} }}}}");
                    if current.contains(&needle) {
                        current = current.replace(&needle, &body);
                        changed = true;
                    } else {
                        // Tolerate `{{>name}}` without surrounding spaces.
                        let tight = format!("{{{{>{name}}}}}");
                        if current.contains(&tight) {
                            current = current.replace(&tight, &body);
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_partial_refs() {
        let refs = extract_partial_refs("Hello {{> role-expert }} and {{>other}}");
        assert_eq!(refs, vec!["role-expert", "other"]);
    }

    #[test]
    fn expand_substitutes_registered_partial() {
        let registry = PartialRegistry::new();
        registry.register("role-expert", "You are an expert.");
        let expanded = registry.expand("{{> role-expert }} Body.", 4);
        assert_eq!(expanded, "You are an expert. Body.");
    }

    #[test]
    fn expand_leaves_unresolved_refs_untouched() {
        let registry = PartialRegistry::new();
        let expanded = registry.expand("{{> missing }}", 4);
        assert_eq!(expanded, "{{> missing }}");
    }

    #[test]
    fn load_from_dir_registers_by_basename() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("role-expert.hbs"), "Expert role").unwrap();
        let registry = PartialRegistry::new();
        let count = registry.load_from_dir(dir.path()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(registry.get("role-expert").as_deref(), Some("Expert role"));
    }
}
