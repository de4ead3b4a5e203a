//! Dataflow job submission and completion tracking.
//!
//! A backup is an export template run per table, a restore is an import
//! template run. [`JobDriver`] launches the template and can then poll the
//! job until it reaches a terminal state:
//! - `JOB_STATE_DONE` is success
//! - `JOB_STATE_FAILED`, `JOB_STATE_CANCELLED` and `JOB_STATE_CANCELLING` are failure
//! - other known states are progress and polling continues
//! - anything unrecognized is tolerated for a bounded number of polls

use crate::gcp::JobService;
use crate::paths::{export_file_prefix, BackupRoot};
use crate::{BackupError, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Export,
    Import,
}

impl JobKind {
    fn as_str(&self) -> &'static str {
        match self {
            JobKind::Export => "export",
            JobKind::Import => "import",
        }
    }
}

/// `{export|import}-{table_id}-{timestamp}`
pub fn job_name(kind: JobKind, table_id: &str, timestamp: i64) -> String {
    format!("{}-{}-{}", kind.as_str(), table_id, timestamp)
}

/// The Bigtable table a job reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub project_id: String,
    pub instance_id: String,
    pub table_id: String,
}

/// Where and how a template runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub template_path: String,
    pub temp_location: String,
    pub location: String,
}

/// Everything needed to launch one template job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub table_id: String,
    pub job_name: String,
    pub template_path: String,
    pub parameters: BTreeMap<String, String>,
    pub temp_location: String,
    pub location: String,
}

impl JobSpec {
    /// Export `target` into `{root}{table_id}/{timestamp}/`.
    pub fn export(
        target: &TableTarget,
        root: &BackupRoot,
        timestamp: i64,
        settings: &LaunchSettings,
    ) -> Self {
        let mut parameters = base_parameters(target);
        parameters.insert(
            "destinationPath".to_string(),
            root.backup_path(&target.table_id, timestamp),
        );
        parameters.insert(
            "filenamePrefix".to_string(),
            export_file_prefix(&target.table_id),
        );

        Self::new(JobKind::Export, target, timestamp, settings, parameters)
    }

    /// Import the backup of `target.table_id` taken at `timestamp`.
    pub fn import(
        target: &TableTarget,
        root: &BackupRoot,
        timestamp: i64,
        settings: &LaunchSettings,
    ) -> Self {
        let mut parameters = base_parameters(target);
        parameters.insert(
            "sourcePattern".to_string(),
            root.source_pattern(&target.table_id, timestamp),
        );

        Self::new(JobKind::Import, target, timestamp, settings, parameters)
    }

    fn new(
        kind: JobKind,
        target: &TableTarget,
        timestamp: i64,
        settings: &LaunchSettings,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            table_id: target.table_id.clone(),
            job_name: job_name(kind, &target.table_id, timestamp),
            template_path: settings.template_path.clone(),
            parameters,
            temp_location: settings.temp_location.clone(),
            location: settings.location.clone(),
        }
    }
}

fn base_parameters(target: &TableTarget) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("bigtableProject".to_string(), target.project_id.clone()),
        ("bigtableInstanceId".to_string(), target.instance_id.clone()),
        ("bigtableTableId".to_string(), target.table_id.clone()),
    ])
}

/// Job state as reported by Dataflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Stopped,
    Pending,
    Queued,
    Running,
    Draining,
    ResourceCleaningUp,
    Done,
    Failed,
    Cancelled,
    Cancelling,
    /// Anything else, including `JOB_STATE_UNKNOWN` and a missing state.
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    InProgress,
    Succeeded,
    Failed,
    Unrecognized,
}

impl JobState {
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("JOB_STATE_STOPPED") => JobState::Stopped,
            Some("JOB_STATE_PENDING") => JobState::Pending,
            Some("JOB_STATE_QUEUED") => JobState::Queued,
            Some("JOB_STATE_RUNNING") => JobState::Running,
            Some("JOB_STATE_DRAINING") => JobState::Draining,
            Some("JOB_STATE_RESOURCE_CLEANING_UP") => JobState::ResourceCleaningUp,
            Some("JOB_STATE_DONE") => JobState::Done,
            Some("JOB_STATE_FAILED") => JobState::Failed,
            Some("JOB_STATE_CANCELLED") => JobState::Cancelled,
            Some("JOB_STATE_CANCELLING") => JobState::Cancelling,
            Some(other) => JobState::Unknown(other.to_string()),
            None => JobState::Unknown("JOB_STATE_UNSPECIFIED".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Stopped => "JOB_STATE_STOPPED",
            JobState::Pending => "JOB_STATE_PENDING",
            JobState::Queued => "JOB_STATE_QUEUED",
            JobState::Running => "JOB_STATE_RUNNING",
            JobState::Draining => "JOB_STATE_DRAINING",
            JobState::ResourceCleaningUp => "JOB_STATE_RESOURCE_CLEANING_UP",
            JobState::Done => "JOB_STATE_DONE",
            JobState::Failed => "JOB_STATE_FAILED",
            JobState::Cancelled => "JOB_STATE_CANCELLED",
            JobState::Cancelling => "JOB_STATE_CANCELLING",
            JobState::Unknown(raw) => raw,
        }
    }

    pub fn class(&self) -> StateClass {
        match self {
            JobState::Done => StateClass::Succeeded,
            JobState::Failed | JobState::Cancelled | JobState::Cancelling => StateClass::Failed,
            JobState::Unknown(_) => StateClass::Unrecognized,
            _ => StateClass::InProgress,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often and for how long to poll a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of each delay added or removed at random (0.0..=1.0)
    pub jitter: f64,
    /// Overall limit on waiting; `None` waits as long as the job runs
    pub timeout: Option<Duration>,
    /// Consecutive unrecognized states before giving up; 0 never gives up
    pub max_unknown_states: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            jitter: 0.1,
            timeout: None,
            max_unknown_states: 30,
        }
    }
}

impl PollPolicy {
    /// Delay following `current`, grown by the multiplier and capped.
    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        let cap = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .map_or(cap, |next| next.min(cap))
    }

    /// `delay` spread by up to `jitter` in either direction.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_nan() || self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let jitter = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor)
    }
}

/// A launched job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub project_id: String,
    pub location: String,
    pub job_id: String,
    pub job_name: String,
    pub table_id: String,
    pub last_state: JobState,
}

pub struct JobDriver<'a> {
    service: &'a dyn JobService,
    policy: PollPolicy,
}

impl<'a> JobDriver<'a> {
    pub fn new(service: &'a dyn JobService, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    /// Launch `spec` in `project_id`.
    pub async fn submit(&self, project_id: &str, spec: &JobSpec) -> Result<JobHandle> {
        info!(
            table_id = %spec.table_id,
            job_name = %spec.job_name,
            template = %spec.template_path,
            "Submitting job"
        );

        let job = self
            .service
            .create_job_from_template(project_id, spec)
            .await
            .map_err(|e| BackupError::submission(&spec.table_id, e))?;

        let handle = JobHandle {
            project_id: project_id.to_string(),
            location: spec.location.clone(),
            job_id: job.id,
            job_name: spec.job_name.clone(),
            table_id: spec.table_id.clone(),
            last_state: JobState::from_api(job.current_state.as_deref()),
        };

        info!(
            table_id = %handle.table_id,
            job_id = %handle.job_id,
            "Job submitted"
        );

        Ok(handle)
    }

    /// Poll until the job succeeds, fails, or the policy gives up.
    ///
    /// Returns the final state on success. `cancel` stops the wait (not the
    /// job) with [`BackupError::Cancelled`].
    pub async fn await_completion(
        &self,
        handle: &mut JobHandle,
        cancel: &CancellationToken,
    ) -> Result<JobState> {
        let deadline = self.policy.timeout.map(|timeout| Instant::now() + timeout);
        let mut delay = self.policy.interval;
        let mut unknown_streak: u32 = 0;

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BackupError::Cancelled(format!(
                        "while waiting for job {}",
                        handle.job_id
                    )));
                }
                job = self.service.get_job(&handle.project_id, &handle.location, &handle.job_id) => job?,
            };

            let state = JobState::from_api(job.current_state.as_deref());
            handle.last_state = state.clone();

            match state.class() {
                StateClass::Succeeded => {
                    info!(table_id = %handle.table_id, job_id = %handle.job_id, "Job completed");
                    return Ok(state);
                }
                StateClass::Failed => {
                    return Err(BackupError::JobFailed {
                        job_id: handle.job_id.clone(),
                        state: state.to_string(),
                    });
                }
                StateClass::Unrecognized => {
                    unknown_streak += 1;
                    warn!(
                        job_id = %handle.job_id,
                        state = %state,
                        count = unknown_streak,
                        "Unrecognized job state"
                    );
                    if self.policy.max_unknown_states > 0
                        && unknown_streak >= self.policy.max_unknown_states
                    {
                        return Err(BackupError::UnrecognizedState {
                            job_id: handle.job_id.clone(),
                            state: state.to_string(),
                            count: unknown_streak,
                        });
                    }
                }
                StateClass::InProgress => {
                    unknown_streak = 0;
                    debug!(job_id = %handle.job_id, state = %state, "Job still running");
                }
            }

            let mut sleep_for = self.policy.jittered(delay);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(BackupError::DeadlineExceeded(handle.job_id.clone()));
                }
                sleep_for = sleep_for.min(deadline - now);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BackupError::Cancelled(format!(
                        "while waiting for job {}",
                        handle.job_id
                    )));
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }

            delay = self.policy.next_interval(delay);
        }
    }
}
