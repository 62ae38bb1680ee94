//! Response envelope shared by every endpoint.
//!
//! ```text
//! { "status": ..., "message": ..., "error": ..., "logged_in": false, "data": { ... } }
//! ```
//!
//! `logged_in` is only present on endpoints guarded by a session check, so it
//! is modelled as `Option<bool>` and tested by presence.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Common wrapper around endpoint payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Human readable failure text, preferring `message` over `error`.
    pub fn failure_message(&self) -> Option<String> {
        if let Some(message) = self.message.as_deref().filter(|m| !m.trim().is_empty()) {
            return Some(message.to_string());
        }
        match &self.error {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Reads only the `logged_in` field of a body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoggedInProbe {
    #[serde(default)]
    pub logged_in: Option<bool>,
}

/// The object holding a grant: the root when it carries one of `markers`,
/// otherwise `data` when that is an object, otherwise the root.
pub(crate) fn locate_payload<'a>(root: &'a Value, markers: &[&str]) -> &'a Value {
    if markers.iter().any(|key| root.get(key).is_some()) {
        return root;
    }
    match root.get("data") {
        Some(data) if data.is_object() => data,
        _ => root,
    }
}

/// Accepts `"42"` or `42` and yields `"42"`.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Optional variant of [`string_or_number`]; `null` reads as `None`.
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
