//! Catalogue metadata and the immutable (metadata, content) snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hash::compute_content_hash;

/// Metadata stored alongside the local catalogue copy.
///
/// Never mutated in place: every change produces a new value that replaces
/// the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueMetadata {
    /// When the catalogue last changed upstream.
    pub modification_date: DateTime<Utc>,

    /// When we last polled the upstream successfully.
    pub last_fetch_date: DateTime<Utc>,

    /// SHA-256 of the content, hex encoded. Served as the entity tag.
    pub content_hash: String,

    /// Opaque upstream identity (e.g. GitHub ETag) sent back on the next fetch.
    #[serde(default)]
    pub revision_token: Option<String>,
}

impl CatalogueMetadata {
    /// Build metadata for freshly fetched content, computing its hash.
    pub fn for_content(
        content: &str, modification_date: DateTime<Utc>, last_fetch_date: DateTime<Utc>,
        revision_token: Option<String>,
    ) -> Self {
        Self { modification_date, last_fetch_date, content_hash: compute_content_hash(content), revision_token }
    }

    /// Copy of this metadata with a new `last_fetch_date`.
    pub fn with_last_fetch_date(&self, last_fetch_date: DateTime<Utc>) -> Self {
        Self { last_fetch_date, ..self.clone() }
    }
}

/// Catalogue content and its metadata, always read and replaced together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueSnapshot {
    metadata: CatalogueMetadata,
    content: String,
}

impl CatalogueSnapshot {
    pub fn new(metadata: CatalogueMetadata, content: String) -> Self {
        Self { metadata, content }
    }

    pub fn metadata(&self) -> &CatalogueMetadata {
        &self.metadata
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the stored hash matches the content.
    pub fn is_intact(&self) -> bool {
        super::hash::verify(&self.content, &self.metadata)
    }
}
