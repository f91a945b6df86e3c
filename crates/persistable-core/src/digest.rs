//! # File Digests
//!
//! BLAKE3 digests of encoded files. Because encoding is deterministic, two
//! encodes of the same graph give the same digest, which makes the digest a
//! cheap way to compare outputs across runs and machines of the same
//! byte order.
//!
//! This module is only available with the `crypto-hash` feature enabled.

/// BLAKE3 digest of `data` as a 64-character hex string.
#[must_use]
pub fn digest_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// True if `data` hashes to `expected` (hex, case-insensitive).
#[must_use]
pub fn verify_digest(data: &[u8], expected: &str) -> bool {
    digest_hex(data).eq_ignore_ascii_case(expected.trim())
}
