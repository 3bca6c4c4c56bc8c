//! Content hashing for cache integrity checks and entity tags.

use sha2::{Digest, Sha256};

use super::CatalogueMetadata;

/// Compute the SHA-256 digest of the catalogue content as lowercase hex.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that `metadata` was generated for `content`.
pub fn verify(content: &str, metadata: &CatalogueMetadata) -> bool {
    metadata.content_hash == compute_content_hash(content)
}
