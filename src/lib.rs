//! Library Mirror Core Library
//!
//! Incrementally mirrors an authenticated online library into local text
//! files plus a CSV metadata ledger. Items are addressed by integer
//! identifiers; a run fetches the identifiers between the local resume point
//! and the highest identifier listed on the remote index.
//!
//! # Architecture
//!
//! - [`session`] - Session token holder and the shared refresh gate
//! - [`record`] - Page extraction and text normalization
//! - [`fetch`] - HTTP client, per-item retry state machine and worker pool
//! - [`range`] - Resume point and highest known identifier
//! - [`store`] - Partitioned text files and the metadata ledger
//! - [`sync`] - The end-to-end ingestion pipeline
//! - [`config`] - File-backed CLI defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetch;
pub mod range;
pub mod record;
pub mod session;
pub mod store;
pub mod sync;
mod user_agent;

// Re-export commonly used types
pub use fetch::constants::{DEFAULT_BASE_URL, DEFAULT_COOKIE_NAME, DEFAULT_WORKERS, MAX_WORKERS};
pub use fetch::{
    EngineError, FetchError, FetchOutcome, FetchPool, LibraryClient, MalformedReason, PageSource,
    RetryCoordinator, SyncStats, classify_page,
};
pub use range::{IdRange, RangeError};
pub use record::{HtmlRecordParser, Record, RecordParser, normalize_text};
pub use session::{
    QueuedTokens, SessionError, SessionHolder, SessionRefresher, SessionToken, TokenSource,
};
pub use store::{LedgerRow, LibraryStore, MergeMode, Partition, StoreError};
pub use sync::{LibrarySync, SyncError, SyncOptions, SyncSummary};
