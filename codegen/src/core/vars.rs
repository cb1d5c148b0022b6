//! Workflow variables and `{name}` placeholder formatting.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

/// Variable store shared with the invoking workflow engine.
pub type Variables = BTreeMap<String, Value>;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// Replace `{name}` placeholders with values from `variables`.
///
/// Unknown placeholders are left untouched. String values are inserted
/// verbatim, everything else as compact JSON.
pub fn format_placeholders(template: &str, variables: &Variables) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match variables.get(name) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
