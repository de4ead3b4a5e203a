//! `delete-backup`: remove every object of one backup.

use crate::gcp::ObjectStore;
use crate::index::delete_backup;
use crate::paths::BackupRoot;
use crate::Result;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DeleteBackupArgs {
    pub table_id: String,
    pub backup_path: String,
    pub backup_timestamp: i64,
}

/// Returns the number of objects deleted.
pub async fn execute(
    store: &dyn ObjectStore,
    args: &DeleteBackupArgs,
    cancel: &CancellationToken,
) -> Result<usize> {
    let root = BackupRoot::parse(&args.backup_path)?;
    let deleted = delete_backup(
        store,
        &root,
        &args.table_id,
        args.backup_timestamp,
        cancel,
    )
    .await?;

    println!(
        "Backup deleted for table {} with timestamp {} ({} objects)",
        args.table_id, args.backup_timestamp, deleted
    );

    Ok(deleted)
}
