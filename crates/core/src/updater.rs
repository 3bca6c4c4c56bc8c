//! Periodic catalogue update cycle with rate-limit backoff.
//!
//! Each cycle either skips (backed off or another cycle in flight) or asks the
//! source for the catalogue and applies the outcome. Rate-limit signals of all
//! shapes end up as a single "not before" instant; the periodic trigger is the
//! only retry mechanism.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::Error;
use crate::cache::{CatalogueCache, CatalogueMetadata};
use crate::source::{CatalogueSource, Clock, FetchOutcome, SystemClock};

/// Backoff applied when the source refuses us without saying for how long.
pub const FORBIDDEN_PENALTY_SECS: i64 = 60 * 60;

/// What a single update cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New content was stored and published.
    Updated,
    /// Upstream confirmed the local copy; its fetch date was refreshed.
    Unchanged,
    /// No fetch was attempted because of an earlier backoff.
    Skipped { until: DateTime<Utc> },
    /// The source refused us; no fetch before `until`.
    BackedOff { until: DateTime<Utc> },
    /// The fetch failed at the transport level; nothing changed.
    FetchFailed,
    /// Another cycle is still running.
    Busy,
}

#[derive(Debug)]
struct BackoffState {
    next_allowed_fetch: DateTime<Utc>,
}

/// Drives fetch cycles against a [`CatalogueSource`] and applies their
/// outcomes to a [`CatalogueCache`].
pub struct UpdateCoordinator {
    cache: Arc<CatalogueCache>,
    source: Arc<dyn CatalogueSource>,
    clock: Arc<dyn Clock>,
    backoff: Mutex<BackoffState>,
}

impl UpdateCoordinator {
    pub fn new(cache: Arc<CatalogueCache>, source: Arc<dyn CatalogueSource>) -> Self {
        Self::with_clock(cache, source, Arc::new(SystemClock))
    }

    pub fn with_clock(cache: Arc<CatalogueCache>, source: Arc<dyn CatalogueSource>, clock: Arc<dyn Clock>) -> Self {
        let next_allowed_fetch = clock.now();
        Self { cache, source, clock, backoff: Mutex::new(BackoffState { next_allowed_fetch }) }
    }

    pub fn cache(&self) -> &Arc<CatalogueCache> {
        &self.cache
    }

    /// Earliest instant at which the next fetch may be issued.
    pub async fn next_allowed_fetch(&self) -> DateTime<Utc> {
        self.backoff.lock().await.next_allowed_fetch
    }

    /// Run one update cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when applying a fetched outcome to the cache
    /// fails, e.g. the cache directory is not writable. Transport failures are
    /// reported as [`CycleOutcome::FetchFailed`].
    pub async fn run_cycle(&self) -> Result<CycleOutcome, Error> {
        let Ok(mut backoff) = self.backoff.try_lock() else {
            tracing::debug!("previous catalogue update still running; skipping");
            return Ok(CycleOutcome::Busy);
        };

        tracing::info!("fetching new catalogue");

        let now = self.clock.now();
        if now < backoff.next_allowed_fetch {
            tracing::info!(
                until = %backoff.next_allowed_fetch,
                "catalogue not fetched - we have been rate limited"
            );
            return Ok(CycleOutcome::Skipped { until: backoff.next_allowed_fetch });
        }

        let revision_token = self
            .cache
            .current()
            .and_then(|snapshot| snapshot.metadata().revision_token.clone());

        let outcome = match self.source.fetch(revision_token.as_deref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "cannot fetch catalogue");
                return Ok(CycleOutcome::FetchFailed);
            }
        };

        match outcome {
            FetchOutcome::Updated { content, revision_token, modification_date } => {
                let metadata =
                    CatalogueMetadata::for_content(&content, modification_date, self.clock.now(), revision_token);
                let hash = metadata.content_hash.clone();
                self.cache.apply_updated(content, metadata).await?;
                tracing::info!(%hash, %modification_date, "catalogue fetched - changed");
                Ok(CycleOutcome::Updated)
            }
            FetchOutcome::Unchanged => {
                self.cache.apply_unchanged(self.clock.now()).await?;
                tracing::info!("catalogue fetched - no changes");
                Ok(CycleOutcome::Unchanged)
            }
            FetchOutcome::RateLimited { retry_at } => {
                backoff.next_allowed_fetch = retry_at;
                tracing::warn!(%retry_at, "catalogue not fetched - rate limited");
                Ok(CycleOutcome::BackedOff { until: retry_at })
            }
            FetchOutcome::Forbidden => {
                let until = self.clock.now() + Duration::seconds(FORBIDDEN_PENALTY_SECS);
                backoff.next_allowed_fetch = until;
                tracing::warn!(%until, "catalogue not fetched - forbidden, delaying next fetch");
                Ok(CycleOutcome::BackedOff { until })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CatalogueStore;
    use crate::cache::hash::compute_content_hash;
    use crate::source::FetchError;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(start)))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        responses: StdMutex<VecDeque<Result<FetchOutcome, FetchError>>>,
        calls: StdMutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn push(&self, response: Result<FetchOutcome, FetchError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CatalogueSource for ScriptedSource {
        async fn fetch(&self, prior_revision_token: Option<&str>) -> Result<FetchOutcome, FetchError> {
            self.calls.lock().unwrap().push(prior_revision_token.map(str::to_string));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Malformed("no scripted response".into())))
        }
    }

    struct Harness {
        coordinator: UpdateCoordinator,
        source: Arc<ScriptedSource>,
        clock: Arc<ManualClock>,
        _temp_dir: TempDir,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    async fn harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(CatalogueCache::open(CatalogueStore::with_dir(temp_dir.path())).await);
        let source = Arc::new(ScriptedSource::default());
        let clock = ManualClock::new(start());
        let coordinator = UpdateCoordinator::with_clock(cache, source.clone(), clock.clone());
        Harness { coordinator, source, clock, _temp_dir: temp_dir }
    }

    fn updated(content: &str, token: &str) -> FetchOutcome {
        FetchOutcome::Updated {
            content: content.to_string(),
            revision_token: Some(token.to_string()),
            modification_date: Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_first_cycle_populates_empty_cache() {
        let h = harness().await;
        assert!(h.coordinator.cache().current().is_none());
        h.source.push(Ok(updated("X", "\"rev-1\"")));

        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::Updated);

        let current = h.coordinator.cache().current().unwrap();
        assert_eq!(current.content(), "X");
        assert_eq!(current.metadata().content_hash, compute_content_hash("X"));
        assert_eq!(current.metadata().revision_token.as_deref(), Some("\"rev-1\""));
        assert_eq!(current.metadata().last_fetch_date, start());
        assert_eq!(h.source.calls(), vec![None]);
    }

    #[tokio::test]
    async fn test_unchanged_refreshes_fetch_date_and_sends_token() {
        let h = harness().await;
        h.source.push(Ok(updated("X", "\"rev-1\"")));
        h.coordinator.run_cycle().await.unwrap();

        h.clock.advance(10);
        h.source.push(Ok(FetchOutcome::Unchanged));
        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::Unchanged);

        let current = h.coordinator.cache().current().unwrap();
        assert_eq!(current.content(), "X");
        assert_eq!(current.metadata().last_fetch_date, start() + Duration::seconds(10));
        assert_eq!(h.source.calls(), vec![None, Some("\"rev-1\"".to_string())]);

        let on_disk = h.coordinator.cache().store().load().await.into_snapshot().unwrap();
        assert_eq!(on_disk.metadata().last_fetch_date, start() + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_forbidden_backs_off_one_hour() {
        let h = harness().await;
        h.source.push(Ok(FetchOutcome::Forbidden));

        let outcome = h.coordinator.run_cycle().await.unwrap();

        let expected = start() + Duration::hours(1);
        assert_eq!(outcome, CycleOutcome::BackedOff { until: expected });
        assert_eq!(h.coordinator.next_allowed_fetch().await, expected);
        assert!(h.coordinator.cache().current().is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_exact_retry_time() {
        let h = harness().await;
        let retry_at = start() + Duration::seconds(120);
        h.source.push(Ok(FetchOutcome::RateLimited { retry_at }));

        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::BackedOff { until: retry_at });
        assert_eq!(h.coordinator.next_allowed_fetch().await, retry_at);

        h.clock.advance(10);
        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::Skipped { until: retry_at });
        assert_eq!(h.source.calls().len(), 1);

        h.clock.advance(120);
        h.source.push(Ok(updated("X", "\"rev-1\"")));
        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::Updated);
        assert_eq!(h.source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_replaces_prior_backoff() {
        let h = harness().await;
        h.source.push(Ok(FetchOutcome::Forbidden));
        h.coordinator.run_cycle().await.unwrap();

        h.clock.advance(FORBIDDEN_PENALTY_SECS);
        let retry_at = h.clock.now() + Duration::seconds(5);
        h.source.push(Ok(FetchOutcome::RateLimited { retry_at }));
        h.coordinator.run_cycle().await.unwrap();

        assert_eq!(h.coordinator.next_allowed_fetch().await, retry_at);
    }

    #[tokio::test]
    async fn test_backoff_does_not_touch_cache() {
        let h = harness().await;
        h.source.push(Ok(updated("X", "\"rev-1\"")));
        h.coordinator.run_cycle().await.unwrap();
        let before = h.coordinator.cache().current().unwrap();

        h.source.push(Ok(FetchOutcome::Forbidden));
        h.coordinator.run_cycle().await.unwrap();

        assert_eq!(h.coordinator.cache().current().unwrap(), before);
    }

    #[tokio::test]
    async fn test_fetch_error_changes_nothing() {
        let h = harness().await;
        h.source.push(Ok(updated("X", "\"rev-1\"")));
        h.coordinator.run_cycle().await.unwrap();
        let before = h.coordinator.cache().current().unwrap();
        let backoff_before = h.coordinator.next_allowed_fetch().await;

        h.source.push(Err(FetchError::UnexpectedStatus { url: "https://example.com".into(), status: 502 }));
        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::FetchFailed);

        assert_eq!(h.coordinator.cache().current().unwrap(), before);
        assert_eq!(h.coordinator.next_allowed_fetch().await, backoff_before);

        h.source.push(Ok(FetchOutcome::Unchanged));
        assert_eq!(h.coordinator.run_cycle().await.unwrap(), CycleOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_unchanged_without_baseline_is_an_error() {
        let h = harness().await;
        h.source.push(Ok(FetchOutcome::Unchanged));
        assert!(matches!(h.coordinator.run_cycle().await, Err(Error::NoBaseline)));
    }

    #[tokio::test]
    async fn test_persistence_failure_surfaces() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogueStore::with_dir(temp_dir.path().join("missing"));
        let cache = Arc::new(CatalogueCache::empty(store));
        let source = Arc::new(ScriptedSource::default());
        let coordinator = UpdateCoordinator::with_clock(cache, source.clone(), ManualClock::new(start()));

        source.push(Ok(updated("X", "\"rev-1\"")));
        let result = coordinator.run_cycle().await;

        assert!(matches!(result, Err(Error::Persistence { .. })));
        assert!(coordinator.cache().current().is_none());
    }

    struct GatedSource {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl CatalogueSource for GatedSource {
        async fn fetch(&self, _prior_revision_token: Option<&str>) -> Result<FetchOutcome, FetchError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(FetchOutcome::Forbidden)
        }
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(CatalogueCache::empty(CatalogueStore::with_dir(temp_dir.path())));
        let source =
            Arc::new(GatedSource { entered: tokio::sync::Notify::new(), release: tokio::sync::Notify::new() });
        let coordinator = Arc::new(UpdateCoordinator::with_clock(cache, source.clone(), ManualClock::new(start())));

        let running = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.run_cycle().await }
        });
        source.entered.notified().await;

        assert_eq!(coordinator.run_cycle().await.unwrap(), CycleOutcome::Busy);

        source.release.notify_one();
        let first = running.await.unwrap().unwrap();
        assert!(matches!(first, CycleOutcome::BackedOff { .. }));
    }
}
