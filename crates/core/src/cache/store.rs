//! On-disk copy of the catalogue and its metadata.
//!
//! Two files live in the cache directory: the catalogue content as-is and a
//! JSON metadata record. Loading never fails hard: a missing, unreadable,
//! malformed or unverifiable copy is reported as [`StoreLoad::Absent`] and the
//! first fetch cycle repopulates it. Writes go to a sibling temp file that is
//! renamed into place.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{CatalogueMetadata, CatalogueSnapshot};
use crate::Error;

/// Default file name of the catalogue copy.
pub const DEFAULT_CONTENT_FILE: &str = "catalogue-v1.xml";

/// Default file name of the metadata record.
pub const DEFAULT_METADATA_FILE: &str = "catalogue-v1-metadata.json";

/// Why no usable snapshot was found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    MissingContent,
    MissingMetadata,
    MalformedMetadata,
    IntegrityMismatch,
    Unreadable,
}

/// Result of reading the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLoad {
    Found(CatalogueSnapshot),
    Absent(AbsentReason),
}

impl StoreLoad {
    pub fn into_snapshot(self) -> Option<CatalogueSnapshot> {
        match self {
            StoreLoad::Found(snapshot) => Some(snapshot),
            StoreLoad::Absent(_) => None,
        }
    }
}

/// File-backed catalogue store.
#[derive(Debug, Clone)]
pub struct CatalogueStore {
    dir: PathBuf,
    content_file: String,
    metadata_file: String,
}

impl CatalogueStore {
    pub fn new(dir: impl Into<PathBuf>, content_file: impl Into<String>, metadata_file: impl Into<String>) -> Self {
        Self { dir: dir.into(), content_file: content_file.into(), metadata_file: metadata_file.into() }
    }

    /// Store in `dir` using the default file names.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_CONTENT_FILE, DEFAULT_METADATA_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn content_path(&self) -> PathBuf {
        self.dir.join(&self.content_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(&self.metadata_file)
    }

    /// Create the cache directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::persistence(&self.dir, e))
    }

    /// Read and verify the stored snapshot.
    pub async fn load(&self) -> StoreLoad {
        let content_path = self.content_path();
        let content = match read_file(&content_path).await {
            Ok(Some(content)) => content,
            Ok(None) => return StoreLoad::Absent(AbsentReason::MissingContent),
            Err(reason) => return StoreLoad::Absent(reason),
        };

        let metadata_path = self.metadata_path();
        let raw_metadata = match read_file(&metadata_path).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!(
                    path = %metadata_path.display(),
                    "catalogue copy has no metadata; it cannot be verified and will be ignored"
                );
                return StoreLoad::Absent(AbsentReason::MissingMetadata);
            }
            Err(reason) => return StoreLoad::Absent(reason),
        };

        let metadata: CatalogueMetadata = match serde_json::from_str(&raw_metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(
                    path = %metadata_path.display(),
                    error = %e,
                    "catalogue metadata file is malformed; it will be ignored and overwritten on next fetch"
                );
                return StoreLoad::Absent(AbsentReason::MalformedMetadata);
            }
        };

        let snapshot = CatalogueSnapshot::new(metadata, content);
        if !snapshot.is_intact() {
            tracing::warn!(
                path = %content_path.display(),
                expected = %snapshot.metadata().content_hash,
                "catalogue copy does not match its stored hash; it will be ignored"
            );
            return StoreLoad::Absent(AbsentReason::IntegrityMismatch);
        }

        tracing::info!(
            path = %content_path.display(),
            modification_date = %snapshot.metadata().modification_date,
            last_fetch_date = %snapshot.metadata().last_fetch_date,
            "loaded local catalogue copy"
        );
        StoreLoad::Found(snapshot)
    }

    /// Persist metadata and content.
    pub async fn save(&self, snapshot: &CatalogueSnapshot) -> Result<(), Error> {
        self.save_metadata(snapshot.metadata()).await?;
        write_atomic(&self.content_path(), snapshot.content().as_bytes()).await
    }

    /// Persist the metadata record alone.
    pub async fn save_metadata(&self, metadata: &CatalogueMetadata) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(metadata)?;
        write_atomic(&self.metadata_path(), json.as_bytes()).await
    }
}

async fn read_file(path: &Path) -> Result<Option<String>, AbsentReason> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "cache file does not exist");
            Ok(None)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot read cache file");
            Err(AbsentReason::Unreadable)
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let tmp = temp_path(path);

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::persistence(path, e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::persistence(path, e));
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote cache file");
    Ok(())
}
