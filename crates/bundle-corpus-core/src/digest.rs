//! Content digests.
//!
//! Words are keyed by the SHA-256 of their canonical text, rendered as
//! lowercase hex. Resources arrive with a digest computed upstream and are
//! never re-hashed here.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a canonical word.
pub fn text_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `s` looks like a hex digest of a plausible width.
pub fn is_hex_digest(s: &str) -> bool {
    (16..=128).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_sha256_hex() {
        let d = text_digest("login");
        assert_eq!(d.len(), 64);
        assert_eq!(d, text_digest("login"));
        assert_ne!(d, text_digest("Login"));
        assert!(is_hex_digest(&d));
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            text_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_digest_shape() {
        assert!(!is_hex_digest("xyz"));
        assert!(!is_hex_digest("abc"));
        assert!(is_hex_digest("0123456789abcdef"));
        assert!(!is_hex_digest("0123456789abcdeg"));
    }
}
