//! Discovery and deletion of existing backups.
//!
//! Nothing is recorded about a backup besides the objects it left behind, so
//! the index is rebuilt from a full listing of the backup root each time.

use crate::gcp::{self, ObjectStore};
use crate::paths::{parse_object_name, BackupRoot};
use crate::{BackupError, Result};
use futures_util::TryStreamExt;
use tokio_util::sync::CancellationToken;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Backup timestamps per table id, both in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BackupIndex {
    tables: BTreeMap<String, BTreeSet<i64>>,
}

impl BackupIndex {
    /// Scan every object under `root` and index the backups found.
    ///
    /// `cancel` abandons the scan between pages.
    pub async fn load(
        store: &dyn ObjectStore,
        root: &BackupRoot,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let prefix = root.prefix();
        let mut objects = gcp::all_objects(store, root.bucket(), prefix);
        let mut index = BackupIndex::default();
        let mut scanned = 0usize;

        loop {
            let object = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BackupError::Cancelled(format!("while listing {}", root)));
                }
                object = objects.try_next() => object?,
            };
            let Some(object) = object else { break };

            scanned += 1;
            match parse_object_name(prefix, &object.name) {
                Some((table_id, timestamp)) => index.insert(table_id, timestamp),
                None => {
                    tracing::debug!(object = %object.name, "Skipping object outside the backup layout")
                }
            }
        }

        tracing::debug!(
            root = %root,
            objects = scanned,
            tables = index.tables.len(),
            "Indexed backups"
        );
        Ok(index)
    }

    pub fn insert(&mut self, table_id: String, timestamp: i64) {
        self.tables.entry(table_id).or_default().insert(timestamp);
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Timestamps of `table_id`, oldest first.
    pub fn timestamps(&self, table_id: &str) -> Vec<i64> {
        self.tables
            .get(table_id)
            .map(|timestamps| timestamps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Table ids with at least one backup, in ascending order.
    pub fn table_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.keys().map(String::as_str)
    }

    /// The most recent backup of `table_id`.
    pub fn newest(&self, table_id: &str) -> Result<i64> {
        self.tables
            .get(table_id)
            .and_then(|timestamps| timestamps.last().copied())
            .ok_or_else(|| BackupError::NoBackupsFound(table_id.to_string()))
    }
}

/// Timestamp of the most recent backup of `table_id` under `root`.
pub async fn newest_backup_timestamp(
    store: &dyn ObjectStore,
    root: &BackupRoot,
    table_id: &str,
    cancel: &CancellationToken,
) -> Result<i64> {
    BackupIndex::load(store, root, cancel).await?.newest(table_id)
}

/// Delete every object of one backup, one request per object.
///
/// Returns how many objects were deleted; a missing backup deletes nothing.
/// A failure or cancellation part way leaves the remaining objects in place.
pub async fn delete_backup(
    store: &dyn ObjectStore,
    root: &BackupRoot,
    table_id: &str,
    timestamp: i64,
    cancel: &CancellationToken,
) -> Result<usize> {
    let object_prefix = root.backup_object_prefix(table_id, timestamp);

    // Collect first so deletions don't shift the listing pages under us.
    let names: Vec<String> = gcp::all_objects(store, root.bucket(), &object_prefix)
        .map_ok(|object| object.name)
        .try_collect()
        .await?;

    for name in &names {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled(format!(
                "before deleting gs://{}/{}",
                root.bucket(),
                name
            )));
        }
        tracing::debug!(bucket = %root.bucket(), object = %name, "Deleting object");
        store.delete_object(root.bucket(), name).await?;
    }

    tracing::info!(
        table_id,
        timestamp,
        deleted = names.len(),
        "Deleted backup"
    );
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::fake::FakeObjectStore;

    fn root(path: &str) -> BackupRoot {
        BackupRoot::parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_index_groups_by_table() {
        let store = FakeObjectStore::with_objects(&["a/100/x", "a/200/y", "b/150/z"]);

        let index = BackupIndex::load(&store, &root("bucket"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.timestamps("a"), vec![100, 200]);
        assert_eq!(index.timestamps("b"), vec![150]);
        assert_eq!(
            serde_json::to_string(&index).unwrap(),
            r#"{"a":[100,200],"b":[150]}"#
        );
    }

    #[tokio::test]
    async fn test_index_reads_every_page() {
        let store = FakeObjectStore::with_objects(&[
            "backups/t/1/t:0",
            "backups/t/1/t:1",
            "backups/t/2/t:0",
            "backups/t/3/t:0",
            "backups/u/4/u:0",
        ]);

        let index = BackupIndex::load(&store, &root("gs://bucket/backups"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.timestamps("t"), vec![1, 2, 3]);
        assert_eq!(index.timestamps("u"), vec![4]);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_index_skips_non_backups() {
        let store = FakeObjectStore::with_objects(&[
            "backups/t/100/",
            "backups/t/latest/t:0",
            "backups/t/12a/t:0",
            "backups/README",
            "backups/t//t:0",
            "backups/t/99999999999999999999/t:0",
            "backups/t/300/t:0",
        ]);

        let index = BackupIndex::load(&store, &root("bucket/backups"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.timestamps("t"), vec![300]);
        assert_eq!(index.table_ids().collect::<Vec<_>>(), vec!["t"]);
    }

    #[tokio::test]
    async fn test_newest_is_numeric() {
        let store = FakeObjectStore::with_objects(&["t/9/t:0", "t/10/t:0"]);

        let newest = newest_backup_timestamp(&store, &root("bucket"), "t", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(newest, 10);
    }

    #[tokio::test]
    async fn test_newest_picks_maximum() {
        let store = FakeObjectStore::with_objects(&["t/20/t:0", "t/5/t:0", "t/9/t:0"]);

        let newest = newest_backup_timestamp(&store, &root("bucket"), "t", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(newest, 20);
    }

    #[tokio::test]
    async fn test_newest_without_backups() {
        let empty = FakeObjectStore::with_objects(&[]);
        assert!(matches!(
            newest_backup_timestamp(&empty, &root("bucket"), "t", &CancellationToken::new()).await,
            Err(BackupError::NoBackupsFound(_))
        ));

        let other = FakeObjectStore::with_objects(&["u/1/u:0"]);
        assert!(matches!(
            newest_backup_timestamp(&other, &root("bucket"), "t", &CancellationToken::new()).await,
            Err(BackupError::NoBackupsFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_only_that_backup() {
        let store = FakeObjectStore::with_objects(&[
            "backups/t/1/t:0",
            "backups/t/1/t:1",
            "backups/t/1/t:2",
            "backups/t/10/t:0",
            "backups/u/1/u:0",
        ]);

        let deleted = delete_backup(&store, &root("bucket/backups"), "t", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(store.objects(), vec!["backups/t/10/t:0", "backups/u/1/u:0"]);
    }

    #[tokio::test]
    async fn test_delete_missing_backup_is_noop() {
        let store = FakeObjectStore::with_objects(&["backups/t/1/t:0"]);

        let deleted = delete_backup(&store, &root("bucket/backups"), "t", 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.objects().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_rolled_back() {
        let store = FakeObjectStore::with_objects(&["t/1/t:0", "t/1/t:1", "t/1/t:2"]);
        store.fail_delete_of("t/1/t:1");

        let result = delete_backup(&store, &root("bucket"), "t", 1, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BackupError::Storage(_))));
        assert_eq!(store.objects(), vec!["t/1/t:1", "t/1/t:2"]);
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_listing() {
        let store = FakeObjectStore::with_objects(&["t/1/t:0", "t/2/t:0", "t/3/t:0"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = BackupIndex::load(&store, &root("bucket"), &cancel).await;

        assert!(matches!(result, Err(BackupError::Cancelled(_))));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_delete_keeps_objects() {
        let store = FakeObjectStore::with_objects(&["t/1/t:0", "t/1/t:1"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = delete_backup(&store, &root("bucket"), "t", 1, &cancel).await;

        assert!(matches!(result, Err(BackupError::Cancelled(_))));
        assert_eq!(store.objects(), vec!["t/1/t:0", "t/1/t:1"]);
    }
}
