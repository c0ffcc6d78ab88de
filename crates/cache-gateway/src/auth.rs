//! Bearer-token comparison helpers shared by the management endpoint, the
//! substituter endpoint, and the deployment channels.
//!
//! Token equality is security-sensitive (§9: "public-key authorization...
//! MUST use a timing-safe comparator"), so every comparison goes through
//! [`token_eq`] rather than `==`.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time token comparison via SHA-256 digest, so differing-length
/// tokens don't leak timing information from the raw byte comparison.
pub fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

/// Extract the second whitespace-delimited token from an `Authorization`
/// header, e.g. `Bearer abc123` -> `abc123`. Returns `None` if the header
/// is absent or has no second token.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    raw.split_whitespace().nth(1).map(str::to_string)
}

/// Decode the substituter's HTTP Basic-style token: `base64(":" + token)`,
/// dropping the leading empty-username byte.
pub fn decode_basic_token(raw: &str) -> Option<String> {
    let decoded = BASE64.decode(raw).ok()?;
    if decoded.first() != Some(&b':') {
        return None;
    }
    String::from_utf8(decoded[1..].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_eq_ignores_nothing_but_value() {
        assert!(token_eq("abc", "abc"));
        assert!(!token_eq("abc", "abd"));
        assert!(!token_eq("abc", "abcd"));
    }

    #[test]
    fn decode_basic_token_strips_empty_username() {
        let raw = BASE64.encode(":mytoken");
        assert_eq!(decode_basic_token(&raw).as_deref(), Some("mytoken"));
    }

    #[test]
    fn decode_basic_token_rejects_non_empty_username() {
        let raw = BASE64.encode("user:mytoken");
        assert_eq!(decode_basic_token(&raw), None);
    }
}
