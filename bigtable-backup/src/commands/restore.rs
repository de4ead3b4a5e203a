//! `restore`: import one backup of a table, the newest unless told otherwise.

use super::run_job;
use crate::gcp::ObjectStore;
use crate::index::newest_backup_timestamp;
use crate::job::{JobDriver, JobHandle, JobSpec, LaunchSettings, TableTarget};
use crate::paths::BackupRoot;
use crate::Result;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RestoreBackupArgs {
    pub backup_path: String,
    pub project_id: String,
    pub instance_id: String,
    pub table_id: String,
    pub temp_prefix: String,
    /// Backup to restore; `None` picks the most recent one
    pub backup_timestamp: Option<i64>,
    pub location: String,
    pub import_template: String,
    pub wait: bool,
}

pub async fn execute(
    store: &dyn ObjectStore,
    driver: &JobDriver<'_>,
    args: &RestoreBackupArgs,
    cancel: &CancellationToken,
) -> Result<JobHandle> {
    let root = BackupRoot::parse(&args.backup_path)?;

    let timestamp = match args.backup_timestamp {
        Some(timestamp) => timestamp,
        None => {
            let newest = newest_backup_timestamp(store, &root, &args.table_id, cancel).await?;
            println!("Newest backup for {} is for timestamp {}", args.table_id, newest);
            newest
        }
    };

    tracing::info!(table_id = %args.table_id, timestamp, root = %root, "Restoring backup");

    let target = TableTarget {
        project_id: args.project_id.clone(),
        instance_id: args.instance_id.clone(),
        table_id: args.table_id.clone(),
    };
    let settings = LaunchSettings {
        template_path: args.import_template.clone(),
        temp_location: args.temp_prefix.clone(),
        location: args.location.clone(),
    };
    let spec = JobSpec::import(&target, &root, timestamp, &settings);

    run_job(driver, &args.project_id, &spec, args.wait, cancel).await
}
