//! Bearer token claim decoding
//!
//! Only the payload segment is inspected. Signatures are the server's
//! business; the client needs the `exp` claim to schedule refreshes.
//! Decoding never fails: a malformed token yields empty claims.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize};

/// Claims the client cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry as Unix seconds
    #[serde(
        default,
        deserialize_with = "unix_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
}

// NumericDate may carry a fraction; it is truncated to whole seconds.
#[allow(clippy::cast_possible_truncation)]
fn unix_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(number.and_then(|n| {
        n.as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }))
}

/// Decode the payload segment of `token` into [`Claims`]
#[must_use]
pub fn decode(token: &str) -> Claims {
    token
        .split('.')
        .nth(1)
        .and_then(decode_segment)
        .and_then(|payload| serde_json::from_slice(&payload).ok())
        .unwrap_or_default()
}

/// Expiry of `token`, if it carries one
#[must_use]
pub fn expires_at(token: &str) -> Option<i64> {
    decode(token).exp
}

// Tokens in the wild use either alphabet, with or without padding.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}
