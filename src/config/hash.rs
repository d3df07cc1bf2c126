//! Content hashing for change detection.
//!
//! Packaged code is compared against the deployed code by SHA-256 digest,
//! encoded the same way the provider reports it (standard base64).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Hasher for packaged artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    /// Creates a new content hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the base64-encoded SHA-256 digest of `bytes`.
    #[must_use]
    pub fn sha256_base64(&self, bytes: &[u8]) -> String {
        STANDARD.encode(Sha256::digest(bytes))
    }

    /// Computes the hex-encoded SHA-256 digest of `bytes`.
    #[must_use]
    pub fn sha256_hex(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Human-readable size: bytes below 1 KiB, otherwise KiB rounded up to
    /// one decimal.
    #[must_use]
    pub fn size_description(len: u64) -> String {
        if len < 1024 {
            return format!("{len} bytes");
        }
        // ceil(len / 102.4) / 10 without floating point
        let tenths = (len * 10).div_ceil(1024);
        format!("{}.{} KiB", tenths / 10, tenths % 10)
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
