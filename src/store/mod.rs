//! Local content store: two text partitions plus the metadata ledger.
//!
//! ```text
//! <root>/normal/<id>.text
//! <root>/deleted/<id>.text
//! <root>/metadata.csv
//! ```
//!
//! Partitions are created on first write. An identifier lives in at most one
//! partition, chosen by the record's deleted flag at write time.

mod error;
pub mod ledger;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::record::Record;

pub use error::StoreError;
pub use ledger::{LEDGER_FILE, LedgerMerge, LedgerRow, MergeMode};

/// Extension of partition files.
pub const TEXT_EXTENSION: &str = "text";

/// One of the two content partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Items that are live in the library.
    Normal,
    /// Items the library flags as deleted.
    Deleted,
}

impl Partition {
    /// Both partitions.
    pub const ALL: [Partition; 2] = [Partition::Normal, Partition::Deleted];

    /// The partition a record belongs to.
    #[must_use]
    pub fn for_record(record: &Record) -> Self {
        if record.deleted {
            Self::Deleted
        } else {
            Self::Normal
        }
    }

    /// Directory name under the store root.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Deleted => "deleted",
        }
    }

    /// The other partition.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Normal => Self::Deleted,
            Self::Deleted => Self::Normal,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Handle to a store root on disk.
///
/// The handle holds no open files; callers serialize writes (the sync
/// pipeline persists from a single task).
#[derive(Debug, Clone)]
pub struct LibraryStore {
    root: PathBuf,
    raw_text: bool,
}

impl LibraryStore {
    /// Opens a store at `root`. Nothing is created until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            raw_text: false,
        }
    }

    /// Persist the raw extracted text instead of the normalized text.
    #[must_use]
    pub fn with_raw_text(mut self, raw_text: bool) -> Self {
        self.raw_text = raw_text;
        self
    }

    /// The store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `partition`.
    #[must_use]
    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    /// Path of item `id` in `partition`.
    #[must_use]
    pub fn item_path(&self, partition: Partition, id: u64) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{id}.{TEXT_EXTENSION}"))
    }

    /// Path of the metadata ledger.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    /// Writes the record's text into its partition, replacing any existing
    /// file, and removes a stale copy from the other partition.
    ///
    /// The text goes to `<id>.text.tmp` first and is renamed into place, so
    /// an interrupted write never leaves a partial `<id>.text` behind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory or file cannot be written.
    #[instrument(level = "debug", skip(self, record), fields(id = record.id, deleted = record.deleted))]
    pub async fn persist(&self, record: &Record) -> Result<PathBuf, StoreError> {
        let partition = Partition::for_record(record);
        let dir = self.partition_dir(partition);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let path = self.item_path(partition, record.id);
        write_atomic(&path, record.text(self.raw_text).as_bytes()).await?;

        let stale = self.item_path(partition.other(), record.id);
        match tokio::fs::remove_file(&stale).await {
            Ok(()) => debug!(path = %stale.display(), "removed copy from other partition"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&stale, e)),
        }

        Ok(path)
    }

    /// Identifiers stored in `partition`, from file names that parse as
    /// integers. A missing partition has none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if an existing partition cannot be listed.
    pub fn stored_ids(&self, partition: Partition) -> Result<Vec<u64>, StoreError> {
        let dir = self.partition_dir(partition);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            if let Some(id) = id_from_file_name(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Reads `metadata.csv`; a missing ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if an existing ledger cannot be parsed.
    pub fn read_metadata(&self) -> Result<BTreeMap<u64, LedgerRow>, StoreError> {
        ledger::read_ledger(&self.ledger_path())
    }

    /// Merges ledger rows into `metadata.csv` (see [`ledger::append_rows`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger cannot be read or written.
    pub fn append_metadata(
        &self,
        rows: Vec<LedgerRow>,
        mode: MergeMode,
    ) -> Result<LedgerMerge, StoreError> {
        let loaded = self.read_metadata()?;
        self.merge_metadata(loaded, rows, mode)
    }

    /// Merges ledger rows into a ledger loaded earlier with
    /// [`LibraryStore::read_metadata`] and writes it back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger cannot be written.
    pub fn merge_metadata(
        &self,
        loaded: BTreeMap<u64, LedgerRow>,
        rows: Vec<LedgerRow>,
        mode: MergeMode,
    ) -> Result<LedgerMerge, StoreError> {
        if !rows.is_empty() {
            std::fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        }
        ledger::merge_into(&self.ledger_path(), loaded, rows, mode)
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = ledger::temp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

fn id_from_file_name(path: &Path) -> Option<u64> {
    if path.extension()? != TEXT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
