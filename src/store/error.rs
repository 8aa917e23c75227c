//! Error types for the local library store.

use std::path::PathBuf;

use thiserror::Error;

/// Failures writing or reading the local store. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error on a partition file or directory.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The metadata ledger could not be read or written as CSV.
    #[error("ledger error on {path}: {source}")]
    Ledger {
        /// Path of the ledger file.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a ledger error.
    pub fn ledger(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Ledger {
            path: path.into(),
            source,
        }
    }
}
