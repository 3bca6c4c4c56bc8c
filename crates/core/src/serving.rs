//! Conditional GET decisions for the served catalogue.
//!
//! The HTTP layer hands over the current snapshot and the request's
//! `If-None-Match` / `If-Modified-Since` values and gets back whether to answer
//! 503, 304 or 200 along with the validator headers to attach.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::cache::CatalogueSnapshot;

/// Default freshness window advertised to clients.
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Validators supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestValidators {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl RequestValidators {
    /// Build validators from raw header values. An unparseable
    /// `If-Modified-Since` is ignored.
    pub fn from_header_values(if_none_match: Option<&str>, if_modified_since: Option<&str>) -> Self {
        Self {
            if_none_match: if_none_match.map(str::to_string),
            if_modified_since: if_modified_since.and_then(parse_http_date),
        }
    }
}

/// Headers describing the served representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    /// Quoted entity tag.
    pub etag: String,
    /// IMF-fixdate.
    pub last_modified: String,
}

/// What the HTTP layer should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServingDecision {
    /// No catalogue copy is available yet.
    Unavailable,

    /// The client's copy is current.
    NotModified(Validators),

    /// Send the catalogue.
    Content {
        snapshot: Arc<CatalogueSnapshot>,
        validators: Validators,
        cache_control: String,
        expires: String,
    },
}

/// Caching policy applied to served responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingPolicy {
    pub max_age_secs: u64,
}

impl Default for ServingPolicy {
    fn default() -> Self {
        Self { max_age_secs: DEFAULT_MAX_AGE_SECS }
    }
}

impl ServingPolicy {
    pub fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// `Cache-Control` value: clients may reuse the copy briefly, then must revalidate.
    pub fn cache_control(&self) -> String {
        format!("max-age={}, must-revalidate", self.max_age_secs)
    }

    /// Decide how to answer a request for the catalogue at `now`.
    pub fn evaluate(
        &self, snapshot: Option<Arc<CatalogueSnapshot>>, request: &RequestValidators, now: DateTime<Utc>,
    ) -> ServingDecision {
        let Some(snapshot) = snapshot else {
            return ServingDecision::Unavailable;
        };

        let metadata = snapshot.metadata();
        let validators = Validators {
            etag: format!("\"{}\"", metadata.content_hash),
            last_modified: format_http_date(metadata.modification_date),
        };

        if is_not_modified(request, &metadata.content_hash, metadata.modification_date) {
            return ServingDecision::NotModified(validators);
        }

        let max_age = i64::try_from(self.max_age_secs).unwrap_or(i64::MAX);
        let expires = now
            .checked_add_signed(Duration::seconds(max_age))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        ServingDecision::Content {
            snapshot,
            validators,
            cache_control: self.cache_control(),
            expires: format_http_date(expires),
        }
    }
}

/// `If-None-Match` takes precedence; `If-Modified-Since` is consulted only
/// when no entity tags were sent.
fn is_not_modified(request: &RequestValidators, hash: &str, modified: DateTime<Utc>) -> bool {
    if let Some(if_none_match) = request.if_none_match.as_deref() {
        return etag_matches(if_none_match, hash);
    }

    match request.if_modified_since {
        Some(since) => modified.timestamp() <= since.timestamp(),
        None => false,
    }
}

fn etag_matches(if_none_match: &str, hash: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|etag| {
        let normalized = normalize_etag(etag);
        normalized == "*" || normalized == hash
    })
}

fn normalize_etag(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.trim_matches('"')
}

/// Format an instant as an HTTP date (IMF-fixdate).
pub fn format_http_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date in IMF-fixdate, RFC 850 or asctime form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
