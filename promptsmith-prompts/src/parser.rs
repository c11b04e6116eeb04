//! The per-document parse/validate/classify/compile pipeline (spec §4.4).

use std::path::Path;

use promptsmith_templating::{extract_partial_refs, CompiledTemplate, PartialRegistry, TemplateEngine};
use tracing::warn;

use crate::args::build_arg_schemas;
use crate::document::{PromptDocument, RegistryFile, Visibility, EXCLUDED_BASENAMES};
use crate::error::DocumentFailure;
use crate::group::compute_group;
use crate::runtime::{PromptRuntime, RuntimeStateKind, SourceKind, Status, Version};

/// Everything a single parse needs besides the file path itself.
pub struct ParseContext<'a> {
    /// The source root this file lives under.
    pub root: &'a Path,
    /// Whether this file came from the system source (restricts it to `common`).
    pub registry: Option<&'a RegistryFile>,
    /// Compiles template bodies.
    pub engine: &'a TemplateEngine,
    /// Resolves `{{> name }}` references.
    pub partials: &'a PartialRegistry,
}

/// Outcome of attempting to parse one file.
pub enum ParseOutcome {
    /// Filtered out before any parsing was attempted (wrong extension, or an
    /// excluded basename like `package.json`).
    Skipped,
    /// Successfully classified; may still be `invalid`/`warning`/`disabled`
    /// in its `runtime_state`.
    Parsed {
        /// The classified runtime entry.
        runtime: Box<PromptRuntime>,
        /// The compiled, render-ready template.
        compiled: CompiledTemplate,
    },
    /// Failed in a way that aborts registration for this file but not the
    /// surrounding reload.
    Failed(DocumentFailure),
}

/// Should this path even be attempted by the parser (step 1's extension and
/// excluded-basename checks; group filtering is applied by the caller via
/// [`crate::group::should_load`]).
pub fn is_candidate(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if ext != "yaml" && ext != "yml" {
        return false;
    }
    let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !EXCLUDED_BASENAMES.contains(&basename)
}

/// Run the full parse/validate/classify/compile/overlay pipeline on one file.
pub fn parse_document(path: &Path, ctx: &ParseContext<'_>) -> ParseOutcome {
    if !is_candidate(path) {
        return ParseOutcome::Skipped;
    }

    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) => {
            return ParseOutcome::Failed(DocumentFailure::InvalidDocument(format!(
                "{}: {e}",
                path.display()
            )))
        }
    };

    let document: PromptDocument = match serde_yaml_ng::from_str(&body) {
        Ok(document) => document,
        Err(e) => return ParseOutcome::Failed(DocumentFailure::InvalidDocument(e.to_string())),
    };

    let structural = document.structural_errors();
    if !structural.is_empty() {
        let detail = structural
            .iter()
            .map(|(field, reason)| format!("{field}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        return ParseOutcome::Failed(DocumentFailure::InvalidDocument(detail));
    }

    let mut warnings = Vec::new();
    let (source, status, mut runtime_state) = classify_metadata(&document, &mut warnings);

    check_partial_dependencies(&document, &mut runtime_state, &mut warnings);

    let compiled = match ctx.engine.compile(&document.template, ctx.partials) {
        Ok(compiled) => compiled,
        Err(e) => return ParseOutcome::Failed(DocumentFailure::CompileFailure(e.to_string())),
    };

    let args = build_arg_schemas(&document.args);

    let mut group = compute_group(ctx.root, path);
    let mut visibility: Option<Visibility> = None;

    if let Some(registry) = ctx.registry {
        if let Some(entry) = registry.get(&document.id) {
            let source = SourceKind::Registry;
            runtime_state = if entry.deprecated {
                RuntimeStateKind::Disabled
            } else {
                RuntimeStateKind::Active
            };
            if let Some(overlay_group) = &entry.group {
                group = overlay_group.clone();
            }
            if let Some(overlay_visibility) = entry.visibility {
                visibility = Some(overlay_visibility);
            }
            return ParseOutcome::Parsed {
                runtime: Box::new(PromptRuntime {
                    id: document.id,
                    title: document.title,
                    version: Version::parse(document.version.as_deref().unwrap_or_default())
                        .unwrap_or(Version::ZERO),
                    status,
                    tags: document.tags,
                    use_cases: document.use_cases,
                    runtime_state,
                    source,
                    group,
                    visibility,
                    file_path: path.to_path_buf(),
                    args,
                    warnings,
                }),
                compiled,
            };
        }
    }

    ParseOutcome::Parsed {
        runtime: Box::new(PromptRuntime {
            id: document.id,
            title: document.title,
            version: Version::parse(document.version.as_deref().unwrap_or_default()).unwrap_or(Version::ZERO),
            status,
            tags: document.tags,
            use_cases: document.use_cases,
            runtime_state,
            source,
            group,
            visibility,
            file_path: path.to_path_buf(),
            args,
            warnings,
        }),
        compiled,
    }
}

fn classify_metadata(
    document: &PromptDocument,
    warnings: &mut Vec<String>,
) -> (SourceKind, Status, RuntimeStateKind) {
    if !document.is_metadata_prompt() {
        return (SourceKind::Legacy, Status::Legacy, RuntimeStateKind::Legacy);
    }

    let version_ok = document
        .version
        .as_deref()
        .and_then(Version::parse)
        .is_some();
    let status_parsed = document.status.as_deref().and_then(Status::parse);

    match (version_ok, status_parsed) {
        (true, Some(status)) => (SourceKind::Embedded, status, RuntimeStateKind::Active),
        _ => {
            warnings.push(format!(
                "metadata present but invalid (version={:?}, status={:?})",
                document.version, document.status
            ));
            (SourceKind::Embedded, Status::Draft, RuntimeStateKind::Warning)
        }
    }
}

fn check_partial_dependencies(
    document: &PromptDocument,
    runtime_state: &mut RuntimeStateKind,
    warnings: &mut Vec<String>,
) {
    let referenced: std::collections::HashSet<String> =
        extract_partial_refs(&document.template).into_iter().collect();
    let declared: std::collections::HashSet<String> =
        document.dependencies.partials.iter().cloned().collect();

    let undeclared: Vec<&String> = referenced.difference(&declared).collect();
    if !undeclared.is_empty() {
        let names = undeclared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
        if *runtime_state == RuntimeStateKind::Active {
            *runtime_state = RuntimeStateKind::Warning;
        }
        warnings.push(format!("undeclared partial reference(s): {names}"));
        warn!(id = %document.id, partials = %names, "template references undeclared partials");
    }

    let unused: Vec<&String> = declared.difference(&referenced).collect();
    if !unused.is_empty() {
        let names = unused.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
        warnings.push(format!("declared but unused partial(s): {names}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    fn context<'a>(
        root: &'a Path,
        registry: Option<&'a RegistryFile>,
        engine: &'a TemplateEngine,
        partials: &'a PartialRegistry,
    ) -> ParseContext<'a> {
        ParseContext { root, registry, engine, partials }
    }

    #[test]
    fn is_candidate_rejects_non_yaml_and_excluded_basenames() {
        assert!(!is_candidate(Path::new("/r/package.json")));
        assert!(!is_candidate(Path::new("/r/registry.yaml")));
        assert!(is_candidate(Path::new("/r/code-review.yaml")));
    }

    #[test]
    fn parses_active_metadata_prompt() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "common/code-review.yaml",
            "id: code-review\ntitle: Code Review\ntemplate: \"Review: {{code}}\"\nversion: \"1.0.0\"\nstatus: stable\n",
        );
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), None, &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Active);
                assert_eq!(runtime.source, SourceKind::Embedded);
                assert_eq!(runtime.group, "common");
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn legacy_prompt_without_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "x.yaml", "id: x\ntitle: X\ntemplate: body\n");
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), None, &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Legacy);
                assert_eq!(runtime.source, SourceKind::Legacy);
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn invalid_metadata_becomes_warning() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "x.yaml",
            "id: x\ntitle: X\ntemplate: body\nversion: \"not-semver\"\nstatus: stable\n",
        );
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), None, &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Warning);
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn undeclared_partial_demotes_active_to_warning() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "x.yaml",
            "id: x\ntitle: X\ntemplate: \"{{> role-expert }} body\"\nversion: \"1.0.0\"\nstatus: stable\n",
        );
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        partials.register("role-expert", "Expert.");
        let ctx = context(dir.path(), None, &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Warning);
                assert!(runtime.warnings.iter().any(|w| w.contains("undeclared")));
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn registry_overlay_upgrades_warning_to_active() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "x.yaml",
            "id: x\ntitle: X\ntemplate: body\nversion: \"bogus\"\nstatus: stable\n",
        );
        let registry = RegistryFile::parse("- id: x\n  group: custom\n").unwrap();
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), Some(&registry), &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Active);
                assert_eq!(runtime.source, SourceKind::Registry);
                assert_eq!(runtime.group, "custom");
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn registry_deprecated_disables() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "x.yaml",
            "id: x\ntitle: X\ntemplate: body\nversion: \"1.0.0\"\nstatus: stable\n",
        );
        let registry = RegistryFile::parse("- id: x\n  deprecated: true\n").unwrap();
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), Some(&registry), &engine, &partials);

        match parse_document(&path, &ctx) {
            ParseOutcome::Parsed { runtime, .. } => {
                assert_eq!(runtime.runtime_state, RuntimeStateKind::Disabled);
            }
            _ => panic!("expected a parsed runtime"),
        }
    }

    #[test]
    fn missing_template_is_invalid_document() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "x.yaml", "id: x\ntitle: X\ntemplate: \"\"\n");
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), None, &engine, &partials);

        assert!(matches!(
            parse_document(&path, &ctx),
            ParseOutcome::Failed(DocumentFailure::InvalidDocument(_))
        ));
    }

    #[test]
    fn uncompilable_template_is_compile_failure() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "x.yaml", "id: x\ntitle: X\ntemplate: \"{{ unterminated\"\n");
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let ctx = context(dir.path(), None, &engine, &partials);

        assert!(matches!(
            parse_document(&path, &ctx),
            ParseOutcome::Failed(DocumentFailure::CompileFailure(_))
        ));
    }
}
