//! Placeholder substitution for `#{key}` and `{{key}}` templates.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

/// Variable mapping supplied by the enqueuing caller.
pub type Variables = BTreeMap<String, Value>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{\s*([A-Za-z0-9_.\-]+)\s*\}|\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Replaces every recognised placeholder with the string form of its
/// variable. Missing and null values render as the empty string; anything
/// that is not a recognised placeholder is left untouched.
pub fn render(template: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            variables.get(key).map(value_to_text).unwrap_or_default()
        })
        .into_owned()
}

/// String form of a variable value as it appears in a rendered body.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// True when a value counts as absent for required-variable checks.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}
