//! Decoding of structured model replies
//!
//! Models wrap JSON in code fences, prepend commentary, or return nothing
//! useful at all. [`parse_response`] decodes into a typed struct and falls
//! back to its neutral `Default`; the field helpers [`lenient`] and
//! [`flag_or_true`] keep one bad field from discarding the whole payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// Null or mistyped values decode to the field type's default
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Boolean defaulting to `true` unless the model said `false`
pub fn flag_or_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(true))
}

/// Remove ```json / ``` fences around a reply
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Outermost balanced `{...}` in `s`.
///
/// Braces inside JSON strings are skipped so values like `"a {b}"` do not
/// end the object early.
pub fn extract_json(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a model reply into `T`, falling back to `T::default()`
pub fn parse_response<T>(response: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let body = strip_code_fences(response);

    if let Ok(parsed) = serde_json::from_str::<T>(body) {
        return parsed;
    }

    if let Some(parsed) = extract_json(body).and_then(|json| serde_json::from_str::<T>(json).ok()) {
        return parsed;
    }

    let preview: String = response.chars().take(300).collect();
    warn!("Failed to parse structured response, using defaults: {}", preview);
    T::default()
}
