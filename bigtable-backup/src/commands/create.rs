//! `create`: export every matching table to a new timestamped backup.

use super::{run_job, BatchPolicy};
use crate::gcp::TableAdmin;
use crate::job::{JobDriver, JobHandle, JobSpec, LaunchSettings, TableTarget};
use crate::paths::BackupRoot;
use crate::tables::{effective_prefix, list_table_ids};
use crate::{BackupError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CreateBackupArgs {
    pub project_id: String,
    pub instance_id: String,
    pub table_id_prefix: String,
    pub destination_path: String,
    pub temp_prefix: String,
    pub periodic_table_duration: Duration,
    pub location: String,
    pub export_template: String,
    pub wait: bool,
    pub policy: BatchPolicy,
}

/// Back up all tables matching the prefix, one job at a time.
///
/// Every table of the run shares the timestamp `now`, which is also the
/// backup directory name and the job name suffix.
pub async fn execute(
    admin: &dyn TableAdmin,
    driver: &JobDriver<'_>,
    args: &CreateBackupArgs,
    now: i64,
    cancel: &CancellationToken,
) -> Result<Vec<JobHandle>> {
    let root = BackupRoot::parse(&args.destination_path)?;

    let table_ids = list_table_ids(
        admin,
        &args.project_id,
        &args.instance_id,
        &args.table_id_prefix,
        args.periodic_table_duration,
        now,
    )
    .await?;

    if table_ids.is_empty() {
        return Err(BackupError::NoTablesFound(effective_prefix(
            &args.table_id_prefix,
            args.periodic_table_duration,
            now,
        )));
    }

    tracing::info!(
        tables = table_ids.len(),
        destination = %root,
        timestamp = now,
        "Creating backups"
    );

    let settings = LaunchSettings {
        template_path: args.export_template.clone(),
        temp_location: args.temp_prefix.clone(),
        location: args.location.clone(),
    };

    let mut handles = Vec::with_capacity(table_ids.len());
    let mut failed = Vec::new();

    for table_id in table_ids {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled(format!(
                "before backing up table {}",
                table_id
            )));
        }

        let target = TableTarget {
            project_id: args.project_id.clone(),
            instance_id: args.instance_id.clone(),
            table_id,
        };
        let spec = JobSpec::export(&target, &root, now, &settings);

        match run_job(driver, &args.project_id, &spec, args.wait, cancel).await {
            Ok(handle) => handles.push(handle),
            Err(e @ BackupError::Cancelled(_)) => return Err(e),
            Err(e) => match args.policy {
                BatchPolicy::StopOnFirstError => return Err(e),
                BatchPolicy::ContinueOnError => {
                    tracing::error!(table_id = %target.table_id, error = %e, "Backup failed");
                    failed.push(target.table_id);
                }
            },
        }
    }

    if !failed.is_empty() {
        return Err(BackupError::BatchFailed(failed));
    }

    Ok(handles)
}
