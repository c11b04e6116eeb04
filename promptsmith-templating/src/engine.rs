//! Opaque `compile(source) -> render(ctx) -> text` wrapper.
//!
//! The core treats templates as opaque; this module owns the one concrete
//! choice of engine (Liquid, the teacher's templating dependency) behind that
//! contract. Partial expansion (`{{> name }}`) happens as a textual
//! preprocessing pass against the [`PartialRegistry`] before compilation,
//! since Liquid's own `{% include %}` syntax is not the form this spec's
//! documents use.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TemplateError};
use crate::partials::PartialRegistry;

const MAX_PARTIAL_EXPANSION_DEPTH: usize = 8;

/// A template that has been parsed and is ready to render repeatedly.
///
/// Owns its parsed body by value — never an index into a mutable global
/// table — so a handler closure that captures a `CompiledTemplate` keeps
/// working even while the `PartialRegistry` is mid-rebuild for the next
/// reload pass.
#[derive(Clone)]
pub struct CompiledTemplate {
    parsed: Arc<liquid::Template>,
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate").finish_non_exhaustive()
    }
}

impl CompiledTemplate {
    /// Render this template against a flat `name -> value` context.
    pub fn render(&self, ctx: &HashMap<String, Value>) -> Result<String> {
        let mut object = liquid::Object::new();
        for (key, value) in ctx {
            object.insert(key.clone().into(), json_to_liquid(value));
        }
        self.parsed
            .render(&object)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

fn json_to_liquid(value: &Value) -> liquid::model::Value {
    match value {
        Value::Null => liquid::model::Value::Nil,
        Value::Bool(b) => liquid::model::Value::scalar(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                liquid::model::Value::scalar(i)
            } else {
                liquid::model::Value::scalar(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => liquid::model::Value::scalar(s.clone()),
        Value::Array(items) => {
            liquid::model::Value::Array(items.iter().map(json_to_liquid).collect())
        }
        Value::Object(map) => {
            let mut obj = liquid::Object::new();
            for (k, v) in map {
                obj.insert(k.clone().into(), json_to_liquid(v));
            }
            liquid::model::Value::Object(obj)
        }
    }
}

/// Compiles prompt template bodies, with HTML-escaping disabled (the spec's
/// documents are plain text, not HTML) and partial expansion against a
/// [`PartialRegistry`].
#[derive(Clone)]
pub struct TemplateEngine {
    parser: Arc<liquid::Parser>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Build a new engine. HTML auto-escaping is left disabled by using the
    /// plain (non-HTML) Liquid parser builder.
    pub fn new() -> Self {
        let parser = liquid::ParserBuilder::with_stdlib()
            .build()
            .expect("static liquid stdlib parser configuration is always valid");
        Self {
            parser: Arc::new(parser),
        }
    }

    /// Compile `source`, first expanding any `{{> name }}` partial
    /// references against `partials`.
    pub fn compile(&self, source: &str, partials: &PartialRegistry) -> Result<CompiledTemplate> {
        let expanded = partials.expand(source, MAX_PARTIAL_EXPANSION_DEPTH);
        let parsed = self
            .parser
            .parse(&expanded)
            .map_err(|e| TemplateError::Compile(e.to_string()))?;
        Ok(CompiledTemplate {
            parsed: Arc::new(parsed),
        })
    }

    /// Convenience one-shot compile + render, used by callers that don't
    /// need to retain the compiled template (e.g. ad-hoc rendering in tests).
    pub fn render(&self, source: &str, ctx: &HashMap<String, String>) -> Result<String> {
        let json_ctx = ctx
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.compile(source, &PartialRegistry::new())?.render(&json_ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_renders_simple_template() {
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        let compiled = engine.compile("Review: {{code}}", &partials).unwrap();
        let mut ctx = HashMap::new();
        ctx.insert("code".to_string(), Value::String("x=1".to_string()));
        assert_eq!(compiled.render(&ctx).unwrap(), "Review: x=1");
    }

    #[test]
    fn render_is_pure() {
        let engine = TemplateEngine::new();
        let compiled = engine.compile("{{a}}-{{b}}", &PartialRegistry::new()).unwrap();
        let mut ctx = HashMap::new();
        ctx.insert("a".to_string(), Value::String("1".to_string()));
        ctx.insert("b".to_string(), Value::String("2".to_string()));
        assert_eq!(compiled.render(&ctx).unwrap(), compiled.render(&ctx).unwrap());
    }

    #[test]
    fn compile_expands_partials_before_parsing() {
        let engine = TemplateEngine::new();
        let partials = PartialRegistry::new();
        partials.register("role-expert", "You are an expert.");
        let compiled = engine
            .compile("{{> role-expert }} Review {{code}}.", &partials)
            .unwrap();
        let mut ctx = HashMap::new();
        ctx.insert("code".to_string(), Value::String("x".to_string()));
        assert_eq!(compiled.render(&ctx).unwrap(), "You are an expert. Review x.");
    }

    #[test]
    fn invalid_template_fails_to_compile() {
        let engine = TemplateEngine::new();
        let result = engine.compile("{{ unterminated", &PartialRegistry::new());
        assert!(result.is_err());
    }

    #[test]
    fn html_is_not_escaped() {
        let engine = TemplateEngine::new();
        let compiled = engine.compile("{{code}}", &PartialRegistry::new()).unwrap();
        let mut ctx = HashMap::new();
        ctx.insert("code".to_string(), Value::String("<b>x</b>".to_string()));
        assert_eq!(compiled.render(&ctx).unwrap(), "<b>x</b>");
    }
}
