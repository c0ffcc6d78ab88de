//! Per-cache Ed25519 keypair generation, narinfo fingerprint construction,
//! and signature emission.
//!
//! Key files store the signing authority name alongside the key material:
//! `"<name>.<hostname>-1:" || base64(key_bytes)`. The prefix before the
//! colon is the name clients see in a narinfo's `Sig:` line; the signer
//! reproduces it verbatim on every signature it emits.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use cache_domain::{Error, Result};

/// Builds the canonical fingerprint byte string a narinfo's signature is
/// computed over: `1;/nix/store/<hash>-<suffix>;<nar_hash>;<nar_size>;<refs>`
/// with `refs` the comma-joined `/nix/store/`-prefixed reference list, in
/// stored order.
pub fn fingerprint(
    store_hash: &str,
    store_suffix: &str,
    nar_hash: &str,
    nar_size: i64,
    references: &[String],
) -> Vec<u8> {
    let refs_csv = references
        .iter()
        .map(|r| format!("/nix/store/{r}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("1;/nix/store/{store_hash}-{store_suffix};{nar_hash};{nar_size};{refs_csv}")
        .into_bytes()
}

fn key_file_name(name: &str, hostname: &str) -> String {
    format!("{name}.{hostname}-1")
}

fn encode_key_file(prefix: &str, key_bytes: &[u8]) -> String {
    format!("{prefix}:{}", BASE64.encode(key_bytes))
}

/// Split a key file's content on the first `:` into `(prefix, key_bytes)`.
fn decode_key_file(content: &str) -> Result<(String, Vec<u8>)> {
    let (prefix, body) = content
        .split_once(':')
        .ok_or_else(|| Error::Config("malformed key file: missing ':' separator".into()))?;
    let bytes = BASE64
        .decode(body.trim_end())
        .map_err(|e| Error::Config(format!("malformed key file: {e}")))?;
    Ok((prefix.to_string(), bytes))
}

/// Generate a fresh Ed25519 keypair for a cache and write `key.priv` and
/// `key.pub` into `cache_dir`.
pub fn write_keypair(cache_dir: &Path, name: &str, hostname: &str) -> Result<()> {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    let prefix = key_file_name(name, hostname);

    fs::write(
        cache_dir.join("key.priv"),
        encode_key_file(&prefix, signing_key.as_bytes()),
    )?;
    fs::write(
        cache_dir.join("key.pub"),
        encode_key_file(&prefix, verifying_key.as_bytes()),
    )?;
    Ok(())
}

/// A loaded signing key, ready to sign fingerprints for one cache.
pub struct Signer {
    prefix: String,
    signing_key: SigningKey,
}

impl Signer {
    /// Load `key.priv` from `cache_dir`.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(cache_dir.join("key.priv"))?;
        let (prefix, bytes) = decode_key_file(&content)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Config("key.priv does not contain a 32-byte key".into()))?;
        Ok(Self {
            prefix,
            signing_key: SigningKey::from_bytes(&arr),
        })
    }

    /// Sign `fingerprint` and format as `"<prefix>:<base64(sig)>"`.
    pub fn sign(&self, fingerprint: &[u8]) -> String {
        let sig: Signature = self.signing_key.sign(fingerprint);
        format!("{}:{}", self.prefix, BASE64.encode(sig.to_bytes()))
    }
}

/// Read the public key file's contents (the full `prefix:base64` string,
/// as published verbatim in the cache descriptor's `publicSigningKeys`).
pub fn read_public_key(cache_dir: &Path) -> Result<String> {
    Ok(fs::read_to_string(cache_dir.join("key.pub"))?)
}

/// Verify a signature against the key.pub in `cache_dir`. Exposed for
/// tests exercising the round-trip property; not used on any request path.
pub fn verify(cache_dir: &Path, fingerprint: &[u8], signature: &str) -> Result<bool> {
    let content = fs::read_to_string(cache_dir.join("key.pub"))?;
    let (_prefix, bytes) = decode_key_file(&content)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Config("key.pub does not contain a 32-byte key".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&arr)
        .map_err(|e| Error::Config(format!("invalid public key: {e}")))?;

    let (_sig_prefix, sig_body) = signature
        .split_once(':')
        .ok_or_else(|| Error::BadRequest("malformed signature".into()))?;
    let sig_bytes = BASE64
        .decode(sig_body)
        .map_err(|e| Error::BadRequest(format!("malformed signature: {e}")))?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Error::BadRequest("signature is not 64 bytes".into()))?;
    let sig = Signature::from_bytes(&sig_arr);

    Ok(verifying_key.verify_strict(fingerprint, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_bit_exact() {
        let fp = fingerprint(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "foo-1.0",
            "sha256:deadbeef",
            1234,
            &["bbbb...-bar".to_string(), "cccc...-baz".to_string()],
        );
        let text = String::from_utf8(fp).unwrap();
        assert_eq!(
            text,
            "1;/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-foo-1.0;sha256:deadbeef;1234;/nix/store/bbbb...-bar,/nix/store/cccc...-baz"
        );
    }

    #[test]
    fn fingerprint_empty_refs() {
        let fp = fingerprint("h", "s", "n", 0, &[]);
        assert_eq!(
            String::from_utf8(fp).unwrap(),
            "1;/nix/store/h-s;n;0;"
        );
    }

    #[test]
    fn generate_sign_and_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_keypair(dir.path(), "c1", "cache.example.com").unwrap();

        let pubkey = read_public_key(dir.path()).unwrap();
        assert!(pubkey.starts_with("c1.cache.example.com-1:"));

        let signer = Signer::load(dir.path()).unwrap();
        let fp = fingerprint("h", "s", "n", 10, &[]);
        let sig = signer.sign(&fp);
        assert!(sig.starts_with("c1.cache.example.com-1:"));

        assert!(verify(dir.path(), &fp, &sig).unwrap());
        assert!(!verify(dir.path(), b"tampered", &sig).unwrap());
    }

    #[test]
    fn signature_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_keypair(dir.path(), "c1", "host").unwrap();
        let signer = Signer::load(dir.path()).unwrap();
        let fp = fingerprint("h", "s", "n", 10, &[]);
        assert_eq!(signer.sign(&fp), signer.sign(&fp));
    }
}
