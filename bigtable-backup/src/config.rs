//! Configuration management for the backup tool.
//!
//! Loads configuration from a TOML file. Every section is optional and falls
//! back to the public Google endpoints and the stock Dataflow templates.

use crate::job::PollPolicy;
use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding a pre-issued OAuth2 access token.
pub const ACCESS_TOKEN_ENV: &str = "BIGTABLE_BACKUP_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Bigtable Admin API base URL
    #[serde(default = "default_bigtable_admin_url")]
    pub bigtable_admin: String,

    /// Cloud Storage JSON API base URL
    #[serde(default = "default_storage_url")]
    pub storage: String,

    /// Dataflow API base URL
    #[serde(default = "default_dataflow_url")]
    pub dataflow: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token sent with every request. Obtaining and refreshing it is
    /// left to the caller (e.g. `gcloud auth print-access-token`).
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Template exporting a table to SequenceFiles
    #[serde(default = "default_export_template")]
    pub export: String,

    /// Template importing SequenceFiles into a table
    #[serde(default = "default_import_template")]
    pub import: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Regional endpoint the Dataflow jobs run in
    #[serde(default = "default_location")]
    pub location: String,

    /// Delay before the first status poll is repeated
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for the poll delay once backoff kicks in
    #[serde(default = "default_max_poll_interval_secs")]
    pub max_poll_interval_secs: u64,

    /// Growth factor of the poll delay (1.0 keeps it fixed)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random spread applied to each delay, as a fraction of it
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Give up waiting for a job after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Unrecognized job states tolerated in a row before failing
    #[serde(default = "default_max_unknown_states")]
    pub max_unknown_states: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_bigtable_admin_url() -> String {
    "https://bigtableadmin.googleapis.com".to_string()
}

fn default_storage_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_dataflow_url() -> String {
    "https://dataflow.googleapis.com".to_string()
}

fn default_export_template() -> String {
    "gs://dataflow-templates/latest/Cloud_Bigtable_to_GCS_SequenceFile".to_string()
}

fn default_import_template() -> String {
    "gs://dataflow-templates/latest/GCS_SequenceFile_to_Cloud_Bigtable".to_string()
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_poll_interval_secs() -> u64 {
    60
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_max_unknown_states() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            bigtable_admin: default_bigtable_admin_url(),
            storage: default_storage_url(),
            dataflow: default_dataflow_url(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            export: default_export_template(),
            import: default_import_template(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_interval_secs: default_max_poll_interval_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            timeout_secs: None,
            max_unknown_states: default_max_unknown_states(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Token from the config file, or else from the environment.
    pub fn access_token(&self) -> Option<String> {
        self.auth
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty())
    }
}

/// Longest poll delay accepted from the config file.
const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Largest growth factor accepted for the poll delay.
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

impl JobConfig {
    /// Validated poll settings.
    pub fn poll_policy(&self) -> Result<PollPolicy> {
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(invalid_job_setting(
                "poll_interval_secs",
                format!("must be between 1 and {}", MAX_POLL_INTERVAL_SECS),
            ));
        }
        if self.max_poll_interval_secs < self.poll_interval_secs
            || self.max_poll_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(invalid_job_setting(
                "max_poll_interval_secs",
                format!(
                    "must be between poll_interval_secs and {}",
                    MAX_POLL_INTERVAL_SECS
                ),
            ));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.backoff_multiplier) {
            return Err(invalid_job_setting(
                "backoff_multiplier",
                format!("must be between 1.0 and {}", MAX_BACKOFF_MULTIPLIER),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid_job_setting("jitter", "must be between 0.0 and 1.0"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid_job_setting("timeout_secs", "must be positive"));
        }

        Ok(PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_interval: Duration::from_secs(self.max_poll_interval_secs),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            timeout: self.timeout_secs.map(Duration::from_secs),
            max_unknown_states: self.max_unknown_states,
        })
    }
}

fn invalid_job_setting(key: &str, reason: impl std::fmt::Display) -> BackupError {
    BackupError::Config(format!("[job] {} {}", key, reason))
}
