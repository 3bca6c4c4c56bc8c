//! Contract between the update coordinator and the remote catalogue source.
//!
//! A source performs one conditional fetch and reports one of four outcomes.
//! Anything else (network failure, unexpected status, unparseable upstream
//! metadata) is a [`FetchError`] and leaves all local state untouched.

use chrono::{DateTime, Utc};

/// Result of a fetch that reached the remote source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Remote content changed.
    Updated {
        content: String,
        revision_token: Option<String>,
        modification_date: DateTime<Utc>,
    },

    /// Remote confirmed the prior revision token is still current.
    Unchanged,

    /// Remote refused the request and said when to come back.
    RateLimited { retry_at: DateTime<Utc> },

    /// Remote refused the request without a usable resume time.
    Forbidden,
}

/// Transport-level fetch failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Connection or protocol failure.
    #[error("FETCH_NETWORK: {url}: {message}")]
    Network { url: String, message: String },

    /// Request did not complete within the client timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    Timeout(String),

    /// Remote answered with a status outside the fetch protocol.
    #[error("FETCH_UNEXPECTED_STATUS: {url} returned {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Remote answered but its payload could not be interpreted.
    #[error("FETCH_MALFORMED: {0}")]
    Malformed(String),

    /// Payload exceeded the configured size limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    TooLarge(String),

    /// The HTTP client could not be built.
    #[error("FETCH_CLIENT: {0}")]
    Client(String),
}

/// A remote source of the catalogue.
#[async_trait::async_trait]
pub trait CatalogueSource: Send + Sync {
    /// Fetch the catalogue, sending `prior_revision_token` for a conditional
    /// request when present.
    async fn fetch(&self, prior_revision_token: Option<&str>) -> Result<FetchOutcome, FetchError>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
