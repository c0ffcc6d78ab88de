//! Opaque bearer-token generation for caches, workspaces, and agents.
//!
//! The original tool JWT-encodes `{"name": name}` under the configured
//! signing key and treats the result as an opaque string — nothing ever
//! decodes the token, only compares it for equality. An HMAC-SHA256 digest
//! of the name under the same key gives the same guarantee (deterministic,
//! keyed, unguessable without the key) without pulling in a JWT dependency
//! this service has no other use for.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn generate(name: &str, key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(name.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_name_and_key() {
        assert_eq!(generate("c1", "secret"), generate("c1", "secret"));
    }

    #[test]
    fn differs_across_names() {
        assert_ne!(generate("c1", "secret"), generate("c2", "secret"));
    }
}
