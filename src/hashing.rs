// Content addressing for upload deduplication

use sha2::{Digest, Sha256};

/// Length of a digest produced by [`content_hash`]
pub const DIGEST_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of raw file bytes
#[inline]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
