//! Bounded worker pool that drives identifiers to terminal outcomes.
//!
//! Mirrors a semaphore-gated task model: a dispatcher acquires one permit per
//! identifier before spawning its task, so at most `concurrency` items are in
//! flight. Completed items are emitted as [`TaggedOutcome`]s in completion
//! order, not identifier order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use super::constants::MAX_WORKERS;
use super::retry::{FetchOutcome, RetryCoordinator};
use crate::session::SessionError;

/// Minimum allowed concurrency value.
const MIN_WORKERS: usize = 1;

/// Error type for worker pool operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A session refresh was needed and failed.
    #[error("session refresh failed for item {id}: {source}")]
    Session {
        /// Identifier whose fetch needed the refresh.
        id: u64,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// An outcome tagged with the identifier it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedOutcome {
    /// The dispatched identifier.
    pub id: u64,
    /// Its terminal outcome.
    pub outcome: FetchOutcome,
}

/// Counters for a run, updated concurrently by workers.
#[derive(Debug, Default)]
pub struct SyncStats {
    planned: AtomicUsize,
    dispatched: AtomicUsize,
    fetched: AtomicUsize,
    unavailable: AtomicUsize,
    malformed: AtomicUsize,
    auth_invalid: AtomicUsize,
    auth_retries: AtomicUsize,
}

impl SyncStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers scheduled for the current run.
    #[must_use]
    pub fn planned(&self) -> usize {
        self.planned.load(Ordering::SeqCst)
    }

    /// Identifiers handed to a worker so far.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Items fetched and extracted.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Items the library reported as unavailable.
    #[must_use]
    pub fn unavailable(&self) -> usize {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// Items skipped as malformed (including transport failures).
    #[must_use]
    pub fn malformed(&self) -> usize {
        self.malformed.load(Ordering::SeqCst)
    }

    /// Items that ended as not authenticated (single-shot fetches only).
    #[must_use]
    pub fn auth_invalid(&self) -> usize {
        self.auth_invalid.load(Ordering::SeqCst)
    }

    /// Re-fetches performed after a session refresh.
    #[must_use]
    pub fn auth_retries(&self) -> usize {
        self.auth_retries.load(Ordering::SeqCst)
    }

    /// Items that reached a terminal outcome.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.fetched() + self.unavailable() + self.malformed() + self.auth_invalid()
    }

    pub(crate) fn set_planned(&self, count: usize) {
        self.planned.store(count, Ordering::SeqCst);
    }

    fn increment_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn add_auth_retries(&self, count: u32) {
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        self.auth_retries.fetch_add(count, Ordering::SeqCst);
    }

    /// Counts one terminal outcome.
    pub fn record_outcome(&self, outcome: &FetchOutcome) {
        let counter = match outcome {
            FetchOutcome::Fetched(_) => &self.fetched,
            FetchOutcome::Unavailable => &self.unavailable,
            FetchOutcome::MalformedResponse { .. } => &self.malformed,
            FetchOutcome::AuthInvalid => &self.auth_invalid,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Item sent from workers to the consumer of a pool run.
pub type PoolEvent = Result<TaggedOutcome, EngineError>;

/// Fixed-size pool of fetch workers.
#[derive(Debug, Clone)]
pub struct FetchPool {
    concurrency: usize,
    coordinator: RetryCoordinator,
}

impl FetchPool {
    /// Creates a pool of `concurrency` workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside `1..=64`.
    #[instrument(level = "debug", skip(coordinator))]
    pub fn new(concurrency: usize, coordinator: RetryCoordinator) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            concurrency,
            coordinator,
        })
    }

    /// The configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The coordinator shared by all workers.
    #[must_use]
    pub fn coordinator(&self) -> &RetryCoordinator {
        &self.coordinator
    }

    /// Starts fetching `ids` and returns a stream of completed items.
    ///
    /// Dispatch stops once the receiver is dropped; items already in flight
    /// run to completion and their results are discarded.
    pub fn dispatch(&self, ids: Vec<u64>, stats: Arc<SyncStats>) -> mpsc::Receiver<PoolEvent> {
        let (tx, rx) = mpsc::channel(self.concurrency * 2);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            debug!(items = ids.len(), "dispatching items");
            for id in ids {
                if tx.is_closed() {
                    debug!(id, "receiver dropped, stopping dispatch");
                    break;
                }

                // Blocks while all workers are busy
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    let _ = tx.send(Err(EngineError::SemaphoreClosed)).await;
                    break;
                };

                stats.increment_dispatched();
                let tx = tx.clone();
                let stats = Arc::clone(&stats);
                let coordinator = coordinator.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let event = match coordinator.drive(id).await {
                        Ok(item) => {
                            stats.add_auth_retries(item.auth_retries);
                            stats.record_outcome(&item.outcome);
                            Ok(TaggedOutcome {
                                id,
                                outcome: item.outcome,
                            })
                        }
                        Err(source) => {
                            warn!(id, error = %source, "no session available for item");
                            Err(EngineError::Session { id, source })
                        }
                    };
                    if tx.send(event).await.is_err() {
                        debug!(id, "result dropped, receiver closed");
                    }
                });
            }
        });

        rx
    }

    /// Fetches every identifier and collects the tagged outcomes.
    ///
    /// An empty `ids` returns immediately. Outcomes arrive in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] reported by a worker.
    #[instrument(skip(self, ids), fields(items = ids.len(), workers = self.concurrency))]
    pub async fn run(&self, ids: Vec<u64>) -> Result<Vec<TaggedOutcome>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let expected = ids.len();
        let stats = Arc::new(SyncStats::new());
        stats.set_planned(expected);
        let mut rx = self.dispatch(ids, Arc::clone(&stats));
        let mut outcomes = Vec::with_capacity(expected);

        while let Some(event) = rx.recv().await {
            outcomes.push(event?);
        }

        info!(
            fetched = stats.fetched(),
            unavailable = stats.unavailable(),
            malformed = stats.malformed(),
            auth_retries = stats.auth_retries(),
            "pool run complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::{FetchError, PageSource};
    use crate::record::HtmlRecordParser;
    use crate::session::{QueuedTokens, SessionHolder, SessionRefresher, SessionToken};

    /// Serves a book for every id and tracks the peak number of concurrent fetches.
    #[derive(Default)]
    struct CountingSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for CountingSource {
        async fn fetch_item(&self, id: u64, _token: &SessionToken) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!(
                r#"<h3 class="card-header">Book {id}</h3><div class="card-body">text</div>"#
            ))
        }

        async fn fetch_index(&self, _token: &SessionToken) -> Result<String, FetchError> {
            Ok(String::new())
        }
    }

    fn pool(concurrency: usize, source: Arc<CountingSource>) -> Result<FetchPool, EngineError> {
        let holder = Arc::new(SessionHolder::new(SessionToken::new("t")));
        let refresher = Arc::new(SessionRefresher::new(holder, QueuedTokens::none()));
        let coordinator = RetryCoordinator::new(source, Arc::new(HtmlRecordParser), refresher);
        FetchPool::new(concurrency, coordinator)
    }

    #[test]
    fn test_pool_rejects_zero_workers() {
        let result = pool(0, Arc::new(CountingSource::default()));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_pool_rejects_too_many_workers() {
        let result = pool(65, Arc::new(CountingSource::default()));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 65 })
        ));
    }

    #[tokio::test]
    async fn test_run_empty_ids_returns_empty() {
        let pool = pool(4, Arc::new(CountingSource::default())).unwrap();
        let outcomes = pool.run(Vec::new()).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_returns_one_outcome_per_id() {
        let pool = pool(4, Arc::new(CountingSource::default())).unwrap();
        let outcomes = pool.run((1..=20).collect()).await.unwrap();
        assert_eq!(outcomes.len(), 20);
        let ids: HashSet<u64> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, (1..=20).collect::<HashSet<u64>>());
        for tagged in &outcomes {
            assert!(matches!(&tagged.outcome, FetchOutcome::Fetched(r) if r.id == tagged.id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_respects_concurrency_limit() {
        let source = Arc::new(CountingSource::default());
        let pool = pool(3, Arc::clone(&source)).unwrap();
        pool.run((1..=30).collect()).await.unwrap();
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_worker_is_sequential() {
        let source = Arc::new(CountingSource::default());
        let pool = pool(1, Arc::clone(&source)).unwrap();
        let outcomes = pool.run((1..=5).collect()).await.unwrap();
        assert_eq!(outcomes.len(), 5);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stats_record_outcome() {
        let stats = SyncStats::new();
        stats.record_outcome(&FetchOutcome::Unavailable);
        stats.record_outcome(&FetchOutcome::MalformedResponse {
            reason: crate::fetch::MalformedReason::MissingBody,
        });
        stats.record_outcome(&FetchOutcome::Unavailable);
        assert_eq!(stats.unavailable(), 2);
        assert_eq!(stats.malformed(), 1);
        assert_eq!(stats.fetched(), 0);
        assert_eq!(stats.completed(), 3);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid worker count 0"));
        assert!(msg.contains("64"));
    }
}
