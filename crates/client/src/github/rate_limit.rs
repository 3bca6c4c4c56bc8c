//! GitHub rate-limit header interpretation.
//!
//! A 403 from GitHub either means we hit the API quota or that we were cut off
//! for some other reason. The headers tell the two apart:
//!
//! - `Retry-After`: seconds to wait, sent for secondary limits.
//! - `X-RateLimit-Reset`: epoch second at which the quota refills.
//! - `X-RateLimit-Remaining`: calls left in the current window.
//!
//! GitHub keeps answering 403 for a few seconds after the reset instant, so
//! resume times derived from the quota headers carry a 30 second margin.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Margin added to quota-based resume times.
const RESET_MARGIN_SECS: i64 = 30;

/// Earliest instant at which GitHub should be called again after a 403, or
/// `None` when the response carries no usable retry signal.
///
/// Precedence: `Retry-After` wins, then the quota headers. Unparseable
/// values count as absent; a present value whose instant would overflow
/// yields `None`.
pub fn next_allowed_call(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let retry_after = parse_integer_header(headers, RETRY_AFTER.as_str());
    let reset = parse_integer_header(headers, RATE_LIMIT_RESET);
    let remaining = parse_integer_header(headers, RATE_LIMIT_REMAINING);

    tracing::info!(?retry_after, ?reset, ?remaining, "rate-limit related headers");

    if let Some(seconds) = retry_after {
        return seconds
            .checked_add(1)
            .and_then(Duration::try_seconds)
            .and_then(|wait| now.checked_add_signed(wait));
    }

    let reset = reset?;
    let margin = Duration::seconds(RESET_MARGIN_SECS);
    if remaining.is_some_and(|calls| calls > 0) {
        return now.checked_add_signed(margin);
    }

    DateTime::from_timestamp(reset, 0).and_then(|at| at.checked_add_signed(margin))
}

fn parse_integer_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
