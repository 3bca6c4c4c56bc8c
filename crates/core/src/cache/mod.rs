//! In-memory catalogue copy backed by the on-disk store.
//!
//! This module provides:
//!
//! - Content hashing for integrity checks and entity tags
//! - The immutable (metadata, content) snapshot
//! - A file-backed store with atomic writes
//! - [`CatalogueCache`], which publishes snapshots to concurrent readers
//!
//! All mutation goes through [`CatalogueCache::apply_updated`] and
//! [`CatalogueCache::apply_unchanged`]. Both persist first and publish only on
//! success, so memory never holds a copy the disk does not.

pub mod hash;
pub mod snapshot;
pub mod store;

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::Error;

pub use snapshot::{CatalogueMetadata, CatalogueSnapshot};
pub use store::{AbsentReason, CatalogueStore, StoreLoad};

/// The currently served catalogue, if any.
///
/// Readers clone an `Arc` under a lock held only for the pointer copy, so they
/// never wait on an update cycle's I/O.
#[derive(Debug)]
pub struct CatalogueCache {
    store: CatalogueStore,
    current: RwLock<Option<Arc<CatalogueSnapshot>>>,
}

impl CatalogueCache {
    /// Create a cache and populate it from the store.
    pub async fn open(store: CatalogueStore) -> Self {
        let current = store.load().await.into_snapshot().map(Arc::new);
        if current.is_none() {
            tracing::info!("no usable local catalogue copy; waiting for first fetch");
        }
        Self { store, current: RwLock::new(current) }
    }

    /// Create an empty cache without reading the store.
    pub fn empty(store: CatalogueStore) -> Self {
        Self { store, current: RwLock::new(None) }
    }

    pub fn store(&self) -> &CatalogueStore {
        &self.store
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Option<Arc<CatalogueSnapshot>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Persist and publish freshly fetched content.
    ///
    /// `metadata` must have been built for `content`, see
    /// [`CatalogueMetadata::for_content`].
    pub async fn apply_updated(
        &self, content: String, metadata: CatalogueMetadata,
    ) -> Result<Arc<CatalogueSnapshot>, Error> {
        let snapshot = CatalogueSnapshot::new(metadata, content);
        debug_assert!(snapshot.is_intact(), "metadata hash does not match content");

        self.store.save(&snapshot).await?;

        let snapshot = Arc::new(snapshot);
        self.publish(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Record that upstream confirmed the current copy at `now`.
    pub async fn apply_unchanged(&self, now: DateTime<Utc>) -> Result<Arc<CatalogueSnapshot>, Error> {
        let previous = self.current().ok_or(Error::NoBaseline)?;

        let metadata = previous.metadata().with_last_fetch_date(now);
        self.store.save_metadata(&metadata).await?;

        let snapshot = Arc::new(CatalogueSnapshot::new(metadata, previous.content().to_string()));
        self.publish(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn publish(&self, snapshot: Arc<CatalogueSnapshot>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_cache() -> (CatalogueCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogueCache::empty(CatalogueStore::with_dir(temp_dir.path()));
        (cache, temp_dir)
    }

    fn metadata_for(content: &str, fetched: DateTime<Utc>) -> CatalogueMetadata {
        CatalogueMetadata::for_content(content, fetched - Duration::days(1), fetched, Some("\"rev-1\"".into()))
    }

    #[tokio::test]
    async fn test_open_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CatalogueCache::open(CatalogueStore::with_dir(temp_dir.path())).await;
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn test_open_loads_existing_copy() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogueStore::with_dir(temp_dir.path());
        let meta = metadata_for("<catalogue/>", Utc::now());
        store
            .save(&CatalogueSnapshot::new(meta.clone(), "<catalogue/>".into()))
            .await
            .unwrap();

        let cache = CatalogueCache::open(store).await;
        let current = cache.current().unwrap();
        assert_eq!(current.metadata(), &meta);
        assert_eq!(current.content(), "<catalogue/>");
    }

    #[tokio::test]
    async fn test_apply_updated_publishes_exact_snapshot() {
        let (cache, _temp_dir) = create_test_cache();
        let meta = metadata_for("X", Utc::now());

        cache.apply_updated("X".into(), meta.clone()).await.unwrap();

        let current = cache.current().unwrap();
        assert_eq!(current.metadata(), &meta);
        assert_eq!(current.content(), "X");
        assert_eq!(cache.store().load().await.into_snapshot().as_ref(), Some(current.as_ref()));
    }

    #[tokio::test]
    async fn test_apply_unchanged_advances_last_fetch_date() {
        let (cache, _temp_dir) = create_test_cache();
        let first = Utc::now();
        cache.apply_updated("X".into(), metadata_for("X", first)).await.unwrap();

        let later = first + Duration::seconds(10);
        cache.apply_unchanged(later).await.unwrap();

        let current = cache.current().unwrap();
        assert_eq!(current.content(), "X");
        assert_eq!(current.metadata().last_fetch_date, later);
        assert!(current.metadata().last_fetch_date > first);

        let on_disk = cache.store().load().await.into_snapshot().unwrap();
        assert_eq!(on_disk.metadata().last_fetch_date, later);
    }

    #[tokio::test]
    async fn test_apply_unchanged_without_baseline() {
        let (cache, _temp_dir) = create_test_cache();
        let result = cache.apply_unchanged(Utc::now()).await;
        assert!(matches!(result, Err(Error::NoBaseline)));
    }

    #[tokio::test]
    async fn test_failed_persistence_keeps_stale_copy() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cache");
        let store = CatalogueStore::with_dir(&dir);
        store.ensure_dir().await.unwrap();
        let cache = CatalogueCache::empty(store);

        let now = Utc::now();
        cache.apply_updated("old".into(), metadata_for("old", now)).await.unwrap();

        std::fs::remove_dir_all(&dir).unwrap();

        let result = cache.apply_updated("new".into(), metadata_for("new", now)).await;
        assert!(matches!(result, Err(Error::Persistence { .. })));
        assert_eq!(cache.current().unwrap().content(), "old");

        let result = cache.apply_unchanged(now + Duration::seconds(1)).await;
        assert!(matches!(result, Err(Error::Persistence { .. })));
        assert_eq!(cache.current().unwrap().metadata().last_fetch_date, now);
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot() {
        let (cache, _temp_dir) = create_test_cache();
        let now = Utc::now();
        cache.apply_updated("one".into(), metadata_for("one", now)).await.unwrap();

        let held = cache.current().unwrap();
        cache.apply_updated("two".into(), metadata_for("two", now)).await.unwrap();

        assert_eq!(held.content(), "one");
        assert!(held.is_intact());
        assert_eq!(cache.current().unwrap().content(), "two");
    }
}
