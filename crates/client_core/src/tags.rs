use std::collections::HashSet;

use serde_json::Value;

pub const MAX_TAG_CHARS: usize = 64;

/// Trimmed, lowercased, capped at [`MAX_TAG_CHARS`] characters. An empty
/// result means "discard".
pub fn normalize(raw: impl AsRef<str>) -> String {
    let lowered = raw.as_ref().trim().to_lowercase();
    let capped: String = lowered.chars().take(MAX_TAG_CHARS).collect();
    // The cut can land right after inner whitespace.
    capped.trim_end().to_string()
}

/// Tag input arriving as arbitrary JSON (form payloads, imported data).
pub fn normalize_value(raw: &Value) -> String {
    match raw {
        Value::Null | Value::Bool(false) => String::new(),
        Value::String(text) => normalize(text),
        other => normalize(other.to_string()),
    }
}

pub fn dedupe_and_normalize<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|tag| normalize(tag))
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
#[path = "tests/tags_tests.rs"]
mod tests;
