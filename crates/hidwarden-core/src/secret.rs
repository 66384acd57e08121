//! Shared-secret check gating enrollment.
//!
//! The enrollment prompt compares operator input against a configured
//! SHA-256 digest. Only the digest is ever stored; an empty configured
//! digest rejects every candidate, which fails safe on an unconfigured
//! host.

use sha2::{Digest, Sha256};

/// A configured enrollment secret, held as a lowercase SHA-256 hex digest.
#[derive(Debug, Clone)]
pub struct SharedSecret {
    digest_hex: String,
}

impl SharedSecret {
    /// Wrap a configured hex digest. Not validated here; a malformed
    /// digest simply never matches.
    pub fn from_digest_hex(digest_hex: impl Into<String>) -> Self {
        Self { digest_hex: digest_hex.into().to_lowercase() }
    }

    /// Hex digest for a plaintext secret, for generating config values.
    pub fn digest_of(plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(plaintext.as_bytes());
        hex_encode(hasher.finalize().as_slice())
    }

    /// Check a candidate secret. An empty configured digest never matches.
    pub fn verify(&self, candidate: &str) -> bool {
        if self.digest_hex.is_empty() {
            return false;
        }
        Self::digest_of(candidate) == self.digest_hex
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_secret_verifies() {
        let secret = SharedSecret::from_digest_hex(SharedSecret::digest_of("hunter2"));
        assert!(secret.verify("hunter2"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = SharedSecret::from_digest_hex(SharedSecret::digest_of("hunter2"));
        assert!(!secret.verify("hunter3"));
        assert!(!secret.verify(""));
    }

    #[test]
    fn unconfigured_digest_rejects_everything() {
        let secret = SharedSecret::from_digest_hex("");
        assert!(!secret.verify(""));
        assert!(!secret.verify("anything"));
    }

    #[test]
    fn digest_comparison_is_case_insensitive_on_config() {
        let upper = SharedSecret::digest_of("hunter2").to_uppercase();
        let secret = SharedSecret::from_digest_hex(upper);
        assert!(secret.verify("hunter2"));
    }
}
