//! Utterance analysis: actionability and rule-based parameter extraction.
//!
//! Extraction is deliberately conservative. It fills parameters only when
//! the utterance makes them unambiguous; anything less falls through to the
//! hybrid path where the language model fills the gaps.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value, json};

/// Lead-ins that ask for an explanation rather than an action. These go
/// straight to the language model regardless of how well the words match a
/// tool name.
const EXPLANATORY_LEADS: &[&str] = &[
    "what is",
    "what are",
    "what does",
    "what's",
    "why",
    "explain",
    "describe",
    "define",
    "tell me about",
    "who is",
    "who was",
    "when was",
    "when did",
    "how does",
    "how do",
    "how is",
];

/// `key=value` or `key: value`; values may be quoted strings, bracketed
/// arrays, or bare words.
static KEY_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*("[^"]*"|\[[^\]]*\]|[^\s,]+)"#).ok()
});

/// A lone integer or decimal number.
static NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").ok());

/// Whether the utterance requests an action, as opposed to an explanation.
pub fn is_actionable(utterance: &str) -> bool {
    let lowered = utterance.trim().to_lowercase();
    !EXPLANATORY_LEADS
        .iter()
        .any(|lead| lowered.starts_with(lead))
}

/// Extract tool parameters from the utterance against the tool's schema.
///
/// Returns `Some` only when every required property could be filled;
/// otherwise `None`, signalling that the hybrid path should fill them.
pub fn extract_parameters(utterance: &str, schema: Option<&Value>) -> Option<Map<String, Value>> {
    let schema = schema?;
    let properties = schema.get("properties")?.as_object()?;
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut params = Map::new();

    // Explicit key=value / key: value pairs win.
    if let Some(re) = KEY_VALUE.as_ref() {
        for caps in re.captures_iter(utterance) {
            let key = &caps[1];
            let Some(spec) = properties.get(key) else {
                continue;
            };
            if let Some(value) = coerce(&caps[2], spec) {
                params.insert(key.to_string(), value);
            }
        }
    }

    // A single required numeric property can be filled from a lone number.
    if let [only] = required.as_slice() {
        if !params.contains_key(*only) {
            let wants_number = properties
                .get(*only)
                .and_then(|spec| spec.get("type"))
                .and_then(Value::as_str)
                .is_some_and(|t| t == "number" || t == "integer");
            if wants_number {
                if let Some(n) = lone_number(utterance) {
                    params.insert((*only).to_string(), n);
                }
            }
        }
    }

    if required.iter().all(|name| params.contains_key(*name)) {
        Some(params)
    } else {
        None
    }
}

/// Coerce a raw captured token to the type the schema asks for.
fn coerce(raw: &str, spec: &Value) -> Option<Value> {
    let kind = spec.get("type").and_then(Value::as_str).unwrap_or("string");

    if raw.starts_with('[') {
        return serde_json::from_str(raw).ok();
    }
    let unquoted = raw.trim_matches('"');

    match kind {
        "integer" => unquoted.parse::<i64>().ok().map(Value::from),
        "number" => unquoted
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "boolean" => unquoted.parse::<bool>().ok().map(Value::Bool),
        "array" => serde_json::from_str(raw).ok(),
        _ => Some(json!(unquoted)),
    }
}

/// The utterance's single number, if there is exactly one.
fn lone_number(utterance: &str) -> Option<Value> {
    let re = NUMBER.as_ref()?;
    let mut matches = re.find_iter(utterance);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None; // Ambiguous.
    }

    let raw = first.as_str();
    if raw.contains('.') {
        raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
    } else {
        raw.parse::<i64>().ok().map(Value::from)
    }
}
