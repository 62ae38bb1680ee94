//! Unverified JWT claim reading.
//!
//! Only used for client-side hints (role display, expiry). The server stays
//! authoritative; signatures are not checked here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decode the payload segment of a JWT.
pub fn decode_payload(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Role claims: a `roles` array, or a single `role` string.
pub fn roles(token: &str) -> Option<Vec<String>> {
    let claims = decode_payload(token)?;

    if let Some(Value::Array(items)) = claims.get("roles") {
        return Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }

    claims
        .get("role")
        .and_then(Value::as_str)
        .map(|role| vec![role.to_string()])
}

/// The `exp` claim.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_payload(token)?.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
