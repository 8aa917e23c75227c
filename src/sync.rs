//! The ingestion pipeline: range resolution, parallel fetch, persistence and
//! a single ledger merge per run.
//!
//! Workers only fetch and classify. Every store write happens on the task
//! that consumes the pool's results, so partition files and the ledger have a
//! single writer even though records arrive concurrently.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::fetch::{EngineError, FetchOutcome, FetchPool, SyncStats, TaggedOutcome};
use crate::range::{IdRange, RangeError, highest_known_id_with_refresh, resume_point};
use crate::store::{LedgerMerge, LedgerRow, LibraryStore, MergeMode, Partition, StoreError};

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The identifier range could not be determined.
    #[error("cannot determine identifier range: {0}")]
    Range(#[from] RangeError),

    /// A partition or ledger write failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The worker pool failed (no session available, ...).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Start at 1 instead of the resume point, re-fetch stored items and
    /// replace their ledger rows.
    pub overwrite: bool,
    /// Explicit first identifier.
    pub start: Option<u64>,
    /// Explicit exclusive end; otherwise highest known identifier + 1.
    pub end: Option<u64>,
}

impl SyncOptions {
    fn merge_mode(self) -> MergeMode {
        if self.overwrite {
            MergeMode::Replace
        } else {
            MergeMode::SkipExisting
        }
    }
}

/// Counts per outcome class for a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    /// The identifier range of the run.
    pub range: IdRange,
    /// Identifiers in range that were already stored and not fetched again.
    pub already_stored: usize,
    /// Items written to the normal partition.
    pub stored_normal: usize,
    /// Items written to the deleted partition.
    pub stored_deleted: usize,
    /// Items the library reported as unavailable.
    pub unavailable: usize,
    /// Items skipped as malformed (including transport failures).
    pub malformed: usize,
    /// Re-fetches after a session refresh.
    pub auth_retries: usize,
    /// Replacement tokens installed during the run.
    pub session_refreshes: usize,
    /// Ledger merge counts.
    pub ledger: LedgerMerge,
}

impl SyncSummary {
    fn empty(range: IdRange, already_stored: usize) -> Self {
        Self {
            range,
            already_stored,
            stored_normal: 0,
            stored_deleted: 0,
            unavailable: 0,
            malformed: 0,
            auth_retries: 0,
            session_refreshes: 0,
            ledger: LedgerMerge::default(),
        }
    }

    /// Items written to either partition.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.stored_normal + self.stored_deleted
    }
}

/// Mirrors the remote library into a [`LibraryStore`].
#[derive(Debug)]
pub struct LibrarySync {
    pool: FetchPool,
    store: LibraryStore,
    stats: Arc<SyncStats>,
}

impl LibrarySync {
    /// Creates a pipeline from a configured pool and store.
    #[must_use]
    pub fn new(pool: FetchPool, store: LibraryStore) -> Self {
        Self {
            pool,
            store,
            stats: Arc::new(SyncStats::new()),
        }
    }

    /// Live counters of the current run, for progress reporting.
    #[must_use]
    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    /// The store this pipeline writes to.
    #[must_use]
    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    /// Determines the identifier range for `options`.
    ///
    /// The start is the explicit start, else 1 with `overwrite`, else the
    /// resume point of the store. The end is the explicit end, else the
    /// highest identifier on the index plus one.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Range`] if the index cannot be read and
    /// [`SyncError::Store`] if the store cannot be inspected.
    #[instrument(skip(self))]
    pub async fn resolve_range(&self, options: SyncOptions) -> Result<IdRange, SyncError> {
        let start = match options.start {
            Some(start) => start,
            None if options.overwrite => 1,
            None => {
                let store = self.store.clone();
                tokio::task::spawn_blocking(move || resume_point(&store)).await??
            }
        };
        let end = match options.end {
            Some(end) => end,
            None => {
                let coordinator = self.pool.coordinator();
                let highest = highest_known_id_with_refresh(
                    coordinator.source().as_ref(),
                    coordinator.refresher(),
                )
                .await?;
                highest.saturating_add(1)
            }
        };
        let range = IdRange::new(start, end);
        info!(%range, "resolved identifier range");
        Ok(range)
    }

    /// Resolves the range and runs it.
    ///
    /// # Errors
    ///
    /// See [`LibrarySync::resolve_range`] and [`LibrarySync::run_range`].
    pub async fn run(&self, options: SyncOptions) -> Result<SyncSummary, SyncError> {
        let range = self.resolve_range(options).await?;
        self.run_range(range, options).await
    }

    /// Fetches every identifier of `range`, persists fetched records and
    /// merges their ledger rows.
    ///
    /// Without `overwrite`, identifiers already present in either partition
    /// are not fetched again. Per-item failures are counted and skipped.
    ///
    /// # Errors
    ///
    /// An unreadable ledger fails the run before anything is fetched. A store
    /// failure or a failed session refresh aborts the run; ledger rows of
    /// records persisted before the failure are still merged.
    #[instrument(skip(self, options), fields(range = %range, overwrite = options.overwrite))]
    pub async fn run_range(
        &self,
        range: IdRange,
        options: SyncOptions,
    ) -> Result<SyncSummary, SyncError> {
        let Plan {
            ids,
            already_stored,
            ledger,
        } = self.plan(range, options).await?;
        let mut summary = SyncSummary::empty(range, already_stored);
        self.stats.set_planned(ids.len());

        if ids.is_empty() {
            info!(already_stored, "nothing to fetch");
            return Ok(summary);
        }

        info!(
            items = ids.len(),
            already_stored,
            workers = self.pool.concurrency(),
            "fetching items"
        );

        let retries_before = self.stats.auth_retries();
        let refreshes_before = self.pool.coordinator().refresher().refreshes();
        let mut rx = self.pool.dispatch(ids, Arc::clone(&self.stats));
        let mut rows = Vec::new();
        let mut failure: Option<SyncError> = None;

        while let Some(event) = rx.recv().await {
            let TaggedOutcome { id, outcome } = match event {
                Ok(tagged) => tagged,
                Err(e) => {
                    failure = Some(e.into());
                    break;
                }
            };

            match outcome {
                FetchOutcome::Fetched(record) => match self.store.persist(&record).await {
                    Ok(path) => {
                        let partition = Partition::for_record(&record);
                        info!(id, %partition, path = %path.display(), "stored item");
                        match partition {
                            Partition::Normal => summary.stored_normal += 1,
                            Partition::Deleted => summary.stored_deleted += 1,
                        }
                        rows.push(LedgerRow::from(&record));
                    }
                    Err(e) => {
                        failure = Some(e.into());
                        break;
                    }
                },
                FetchOutcome::Unavailable => {
                    summary.unavailable += 1;
                    warn!(id, "item unavailable, skipping");
                }
                FetchOutcome::MalformedResponse { reason } => {
                    summary.malformed += 1;
                    warn!(id, %reason, "unrecognized item page, skipping");
                }
                FetchOutcome::AuthInvalid => {
                    summary.malformed += 1;
                    warn!(id, "item ended unauthenticated, skipping");
                }
            }
        }
        drop(rx);

        let store = self.store.clone();
        let mode = options.merge_mode();
        let merged =
            tokio::task::spawn_blocking(move || store.merge_metadata(ledger, rows, mode)).await;

        if let Some(failure) = failure {
            match merged {
                Ok(Ok(merge)) => debug!(appended = merge.appended, "ledger merged before abort"),
                Ok(Err(e)) => error!(error = %e, "ledger merge failed during abort"),
                Err(e) => error!(error = %e, "ledger task failed during abort"),
            }
            return Err(failure);
        }

        summary.ledger = merged??;
        summary.auth_retries = self.stats.auth_retries() - retries_before;
        summary.session_refreshes =
            self.pool.coordinator().refresher().refreshes() - refreshes_before;

        info!(
            stored_normal = summary.stored_normal,
            stored_deleted = summary.stored_deleted,
            unavailable = summary.unavailable,
            malformed = summary.malformed,
            session_refreshes = summary.session_refreshes,
            "sync complete"
        );
        Ok(summary)
    }

    /// Reads the store on the blocking pool and decides what to fetch.
    async fn plan(&self, range: IdRange, options: SyncOptions) -> Result<Plan, SyncError> {
        let store = self.store.clone();
        let overwrite = options.overwrite;
        let plan =
            tokio::task::spawn_blocking(move || plan_range(&store, range, overwrite)).await??;
        Ok(plan)
    }
}

/// Work for one run.
struct Plan {
    /// Identifiers to fetch.
    ids: Vec<u64>,
    /// Identifiers in range skipped because they are already stored.
    already_stored: usize,
    /// The ledger as loaded before any write of this run.
    ledger: BTreeMap<u64, LedgerRow>,
}

fn plan_range(store: &LibraryStore, range: IdRange, overwrite: bool) -> Result<Plan, StoreError> {
    // An unreadable ledger must fail the run before any item file is written.
    let ledger = store.read_metadata()?;
    if overwrite {
        return Ok(Plan {
            ids: range.ids(),
            already_stored: 0,
            ledger,
        });
    }

    let mut stored = HashSet::new();
    for partition in Partition::ALL {
        stored.extend(store.stored_ids(partition)?);
    }
    let (skipped, ids): (Vec<u64>, Vec<u64>) =
        range.ids().into_iter().partition(|id| stored.contains(id));
    Ok(Plan {
        ids,
        already_stored: skipped.len(),
        ledger,
    })
}
