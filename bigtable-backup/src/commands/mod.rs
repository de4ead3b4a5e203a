//! One module per CLI subcommand.

pub mod create;
pub mod delete;
pub mod list;
pub mod restore;

use crate::job::{JobDriver, JobHandle, JobSpec};
use crate::Result;
use tokio_util::sync::CancellationToken;

/// What a multi-table run does when one table fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Abort the run; later tables are not attempted.
    #[default]
    StopOnFirstError,
    /// Attempt every table and report all failures at the end.
    ContinueOnError,
}

/// Submit `spec` and, if asked to, wait for the job to finish.
pub(crate) async fn run_job(
    driver: &JobDriver<'_>,
    project_id: &str,
    spec: &JobSpec,
    wait: bool,
    cancel: &CancellationToken,
) -> Result<JobHandle> {
    let mut handle = driver.submit(project_id, spec).await?;
    println!("Created job {} ({}) for table {}", handle.job_name, handle.job_id, handle.table_id);

    if wait {
        println!("Waiting for job {} to finish...", handle.job_name);
        let state = driver.await_completion(&mut handle, cancel).await?;
        println!("Job {} finished with state {}", handle.job_name, state);
    }

    Ok(handle)
}
