//! Argument schema construction and value coercion.

use std::collections::HashMap;

use serde_json::Value;

use crate::document::{ArgDocument, ArgTypeDocument};
use crate::runtime::ArgSchema;

/// Build the coerced argument schema for a document's `args` mapping.
///
/// Requiredness: an explicit `required` wins; else a present `default` or
/// the case-insensitive token `optional` in the description makes it
/// optional; else the token `(required)` in the description makes it
/// required; otherwise it defaults to required.
pub fn build_arg_schemas(args: &HashMap<String, ArgDocument>) -> HashMap<String, ArgSchema> {
    args.iter()
        .map(|(name, spec)| {
            let description_lower = spec.description.as_deref().unwrap_or_default().to_lowercase();
            // `(required)` in the description is accepted but changes
            // nothing: every other path already defaults to required.
            let required = match spec.required {
                Some(explicit) => explicit,
                None => !(spec.default.is_some() || description_lower.contains("optional")),
            };
            (
                name.clone(),
                ArgSchema {
                    arg_type: spec.arg_type,
                    description: spec.description.clone(),
                    default: spec.default.clone(),
                    required,
                },
            )
        })
        .collect()
}

/// Coerce a raw tool-call argument value against its declared schema.
/// Numbers accept numeric strings; booleans accept `"true"`/`"false"`.
pub fn coerce_value(schema: &ArgSchema, value: &Value) -> Result<Value, String> {
    match (schema.arg_type, value) {
        (ArgTypeDocument::String, Value::String(_)) => Ok(value.clone()),
        (ArgTypeDocument::String, other) => Ok(Value::String(other.to_string())),
        (ArgTypeDocument::Number, Value::Number(_)) => Ok(value.clone()),
        (ArgTypeDocument::Number, Value::String(s)) => s
            .parse::<f64>()
            .map(|n| serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))
            .map_err(|_| format!("'{s}' is not a valid number")),
        (ArgTypeDocument::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (ArgTypeDocument::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a valid boolean")),
        },
        (expected, actual) => Err(format!("expected {expected:?}, got {actual}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(default: Option<Value>, required: Option<bool>, description: Option<&str>) -> ArgDocument {
        ArgDocument {
            arg_type: ArgTypeDocument::String,
            description: description.map(str::to_string),
            default,
            required,
        }
    }

    #[test]
    fn explicit_required_wins_over_default() {
        let mut args = HashMap::new();
        args.insert("a".to_string(), spec(Some(Value::String("x".into())), Some(true), None));
        let schemas = build_arg_schemas(&args);
        assert!(schemas["a"].required);
    }

    #[test]
    fn default_makes_optional() {
        let mut args = HashMap::new();
        args.insert("a".to_string(), spec(Some(Value::String("x".into())), None, None));
        let schemas = build_arg_schemas(&args);
        assert!(!schemas["a"].required);
    }

    #[test]
    fn optional_token_in_description_makes_optional() {
        let mut args = HashMap::new();
        args.insert("a".to_string(), spec(None, None, Some("an Optional flag")));
        let schemas = build_arg_schemas(&args);
        assert!(!schemas["a"].required);
    }

    #[test]
    fn required_token_in_description_makes_required() {
        let mut args = HashMap::new();
        args.insert("a".to_string(), spec(None, None, Some("the code (required)")));
        let schemas = build_arg_schemas(&args);
        assert!(schemas["a"].required);
    }

    #[test]
    fn defaults_to_required_with_no_signal() {
        let mut args = HashMap::new();
        args.insert("a".to_string(), spec(None, None, None));
        let schemas = build_arg_schemas(&args);
        assert!(schemas["a"].required);
    }

    #[test]
    fn coerces_numeric_string() {
        let schema = ArgSchema {
            arg_type: ArgTypeDocument::Number,
            description: None,
            default: None,
            required: true,
        };
        assert_eq!(
            coerce_value(&schema, &Value::String("42".to_string())).unwrap(),
            Value::from(42.0)
        );
    }

    #[test]
    fn coerces_boolean_string() {
        let schema = ArgSchema {
            arg_type: ArgTypeDocument::Boolean,
            description: None,
            default: None,
            required: true,
        };
        assert_eq!(coerce_value(&schema, &Value::String("true".to_string())).unwrap(), Value::Bool(true));
        assert!(coerce_value(&schema, &Value::String("nope".to_string())).is_err());
    }
}
