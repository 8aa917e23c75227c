//! Resume point of incremental runs, derived from what is already stored.

use tracing::debug;

use crate::store::{LibraryStore, Partition, StoreError};

/// Returns `1 + max(id)` over both partitions, or `1` for an empty store.
///
/// # Errors
///
/// Returns [`StoreError`] if an existing partition cannot be listed.
pub fn resume_point(store: &LibraryStore) -> Result<u64, StoreError> {
    let mut highest = None;
    for partition in Partition::ALL {
        let partition_max = store.stored_ids(partition)?.into_iter().max();
        highest = highest.max(partition_max);
    }
    let resume = highest.map_or(1, |id| id.saturating_add(1));
    debug!(highest = ?highest, resume, "computed resume point");
    Ok(resume)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(store: &LibraryStore, partition: Partition, name: &str) {
        let dir = store.partition_dir(partition);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), "x").unwrap();
    }

    #[test]
    fn test_empty_store_resumes_at_one() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("missing"));
        assert_eq!(resume_point(&store).unwrap(), 1);
    }

    #[test]
    fn test_empty_partitions_resume_at_one() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path());
        fs::create_dir_all(store.partition_dir(Partition::Normal)).unwrap();
        fs::create_dir_all(store.partition_dir(Partition::Deleted)).unwrap();
        assert_eq!(resume_point(&store).unwrap(), 1);
    }

    #[test]
    fn test_resume_after_highest_normal_id() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path());
        for id in 1..=5 {
            touch(&store, Partition::Normal, &format!("{id}.text"));
        }
        assert_eq!(resume_point(&store).unwrap(), 6);
    }

    #[test]
    fn test_resume_considers_deleted_partition() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path());
        touch(&store, Partition::Normal, "4.text");
        touch(&store, Partition::Deleted, "11.text");
        assert_eq!(resume_point(&store).unwrap(), 12);
    }

    #[test]
    fn test_resume_ignores_unparseable_files() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path());
        touch(&store, Partition::Normal, "3.text");
        touch(&store, Partition::Normal, "draft.text");
        assert_eq!(resume_point(&store).unwrap(), 4);
    }
}
