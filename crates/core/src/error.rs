//! Unified error types for the catalogue server.
//!
//! Fetch outcomes such as rate limiting are not errors; they live in
//! [`crate::source::FetchOutcome`]. What remains here are the failures that
//! abort an update cycle or the process.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Unified error type for cache, store and configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cache file could not be written. The in-memory copy is left stale.
    #[error(
        "CACHE_WRITE_FAILED: {path}: {source}. Check your configuration. Is the cache directory writable?"
    )]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be serialized.
    #[error("METADATA_ENCODE_FAILED: {0}")]
    MetadataEncode(#[from] serde_json::Error),

    /// An "unchanged" outcome arrived while no catalogue copy exists.
    #[error("NO_BASELINE: catalogue reported unchanged but no local copy exists")]
    NoBaseline,

    /// Configuration could not be loaded or validated.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::persistence(
            "/cache/catalogue-v1.xml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("CACHE_WRITE_FAILED"));
        assert!(msg.contains("/cache/catalogue-v1.xml"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_no_baseline_display() {
        assert!(Error::NoBaseline.to_string().contains("NO_BASELINE"));
    }
}
