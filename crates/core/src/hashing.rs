//! Shared SHA-256 hex digest utility.
//!
//! Refresh tokens are stored only as a fast digest of their raw bytes. The
//! digest is an integrity check, not a password hash, so SHA-256 is enough.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Digest of a raw refresh token as persisted in `refresh_token_digest`.
pub fn refresh_token_digest(raw_token: &str) -> String {
    sha256_hex(raw_token.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn refresh_digest_is_stable_and_hex() {
        let a = refresh_token_digest("header.payload.signature");
        let b = refresh_token_digest("header.payload.signature");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, refresh_token_digest("header.payload.signaturf"));
    }
}
