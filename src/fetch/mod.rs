//! Fetching library items.
//!
//! - [`LibraryClient`] / [`PageSource`]: raw page access with the session cookie
//! - [`RetryCoordinator`]: per-item state machine with session recovery
//! - [`FetchPool`]: bounded parallel dispatch of identifiers

mod client;
pub mod constants;
mod engine;
mod error;
mod retry;

pub use client::{LibraryClient, PageSource};
pub use engine::{EngineError, FetchPool, PoolEvent, SyncStats, TaggedOutcome};
pub use error::FetchError;
pub use retry::{DrivenItem, FetchOutcome, MalformedReason, RetryCoordinator, classify_page};
