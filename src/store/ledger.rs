//! The metadata ledger (`metadata.csv`): one row per stored identifier.
//!
//! The ledger is merged once per run: the existing file is read into a map
//! keyed by identifier, new rows are merged in, and the result is written to
//! a temporary file that is renamed over the ledger. Readers see either the
//! old or the new ledger, never a partial one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::StoreError;
use crate::record::Record;

/// File name of the ledger inside the store root.
pub const LEDGER_FILE: &str = "metadata.csv";

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Item identifier.
    #[serde(rename = "ID")]
    pub id: u64,
    /// Item title.
    #[serde(rename = "Title")]
    pub title: String,
    /// Author display name.
    #[serde(rename = "Author")]
    pub author: String,
    /// Author account key.
    #[serde(rename = "AccountKey")]
    pub account_key: String,
    /// Whether the item was stored in the deleted partition.
    #[serde(rename = "Deleted")]
    pub deleted: bool,
    /// Publication time.
    #[serde(rename = "PublishedAt")]
    pub published_at: DateTime<Utc>,
    /// Publication round.
    #[serde(rename = "PublishedRound")]
    pub published_round: i64,
}

impl From<&Record> for LedgerRow {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            author: record.author.clone(),
            account_key: record.account_key.clone(),
            deleted: record.deleted,
            published_at: record.published_at,
            published_round: record.published_round,
        }
    }
}

/// How rows for identifiers already in the ledger are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Keep existing rows; new rows for known identifiers are dropped.
    #[default]
    SkipExisting,
    /// Replace existing rows with the new ones.
    Replace,
}

/// Result of a ledger merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerMerge {
    /// Rows for identifiers not previously in the ledger.
    pub appended: usize,
    /// Existing rows replaced (replace mode only).
    pub replaced: usize,
    /// New rows dropped because the identifier already had a row.
    pub skipped: usize,
    /// Rows in the ledger after the merge.
    pub total: usize,
}

/// Reads the ledger at `path` into a map keyed by identifier.
///
/// A missing file is an empty ledger. If the file holds duplicate identifiers
/// the first row wins.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be read as a ledger.
pub fn read_ledger(path: &Path) -> Result<BTreeMap<u64, LedgerRow>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut reader = csv::Reader::from_reader(file);
    let mut rows = BTreeMap::new();
    for row in reader.deserialize::<LedgerRow>() {
        let row = row.map_err(|e| StoreError::ledger(path, e))?;
        if rows.contains_key(&row.id) {
            warn!(id = row.id, "duplicate ledger row ignored");
            continue;
        }
        rows.insert(row.id, row);
    }
    Ok(rows)
}

/// Merges `new_rows` into `ledger` according to `mode`.
pub fn merge_rows(
    ledger: &mut BTreeMap<u64, LedgerRow>,
    new_rows: impl IntoIterator<Item = LedgerRow>,
    mode: MergeMode,
) -> LedgerMerge {
    let mut merge = LedgerMerge::default();
    for row in new_rows {
        match ledger.get_mut(&row.id) {
            None => {
                ledger.insert(row.id, row);
                merge.appended += 1;
            }
            Some(existing) => match mode {
                MergeMode::SkipExisting => merge.skipped += 1,
                MergeMode::Replace => {
                    *existing = row;
                    merge.replaced += 1;
                }
            },
        }
    }
    merge.total = ledger.len();
    merge
}

/// Writes the ledger to `path` via a temporary file and rename.
///
/// # Errors
///
/// Returns [`StoreError`] on any write, flush or rename failure; the previous
/// ledger is left untouched in that case.
pub fn write_ledger_atomic(
    path: &Path,
    ledger: &BTreeMap<u64, LedgerRow>,
) -> Result<(), StoreError> {
    let tmp = temp_path(path);

    let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in ledger.values() {
        writer
            .serialize(row)
            .map_err(|e| StoreError::ledger(&tmp, e))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io(&tmp, io::Error::new(e.error().kind(), e.error().to_string())))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    debug!(path = %path.display(), rows = ledger.len(), "ledger written");
    Ok(())
}

/// Reads, merges and atomically rewrites the ledger at `path`.
///
/// Nothing is written when there are no new rows.
///
/// # Errors
///
/// Returns [`StoreError`] if the ledger cannot be read or written.
#[instrument(level = "debug", skip(new_rows), fields(path = %path.display(), rows = new_rows.len()))]
pub fn append_rows(
    path: &Path,
    new_rows: Vec<LedgerRow>,
    mode: MergeMode,
) -> Result<LedgerMerge, StoreError> {
    let ledger = read_ledger(path)?;
    merge_into(path, ledger, new_rows, mode)
}

/// Merges `new_rows` into an already loaded `ledger` and atomically writes
/// the result to `path`.
///
/// Nothing is written when no row was appended or replaced.
///
/// # Errors
///
/// Returns [`StoreError`] if the ledger cannot be written.
pub fn merge_into(
    path: &Path,
    mut ledger: BTreeMap<u64, LedgerRow>,
    new_rows: Vec<LedgerRow>,
    mode: MergeMode,
) -> Result<LedgerMerge, StoreError> {
    if new_rows.is_empty() {
        return Ok(LedgerMerge {
            total: ledger.len(),
            ..LedgerMerge::default()
        });
    }

    let merge = merge_rows(&mut ledger, new_rows, mode);
    if merge.appended > 0 || merge.replaced > 0 {
        write_ledger_atomic(path, &ledger)?;
    }
    info!(
        appended = merge.appended,
        replaced = merge.replaced,
        skipped = merge.skipped,
        total = merge.total,
        "ledger merged"
    );
    Ok(merge)
}

/// Sibling of `path` with `.tmp` appended to the file name.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
