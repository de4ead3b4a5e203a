//! bigtable-backup - Main entry point
//!
//! Command-line tool for creating and restoring Cloud Bigtable backups.

use anyhow::{Context, Result};
use bigtable_backup::commands::{
    self, create::CreateBackupArgs, delete::DeleteBackupArgs, list::OutputFormat,
    restore::RestoreBackupArgs, BatchPolicy,
};
use bigtable_backup::gcp::{ApiClient, BigtableAdminClient, DataflowClient, StorageClient};
use bigtable_backup::job::{JobDriver, PollPolicy};
use bigtable_backup::{shutdown, utils, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "bigtable-backup")]
#[command(author, version, about = "A command-line for creating and restoring backups from bigtable.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true, env = "BIGTABLE_BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create backups for specific table or all the tables for given prefix
    Create {
        /// The ID of the GCP project of the Cloud Bigtable instance that you want to read data from
        #[arg(long)]
        bigtable_project_id: String,

        /// The ID of the Cloud Bigtable instance that contains the table
        #[arg(long)]
        bigtable_instance_id: String,

        /// Prefix to find the IDs of the Cloud Bigtable table to export
        #[arg(long)]
        bigtable_table_id_prefix: String,

        /// GCS path where data should be written. For example, "gs://mybucket/somefolder/"
        #[arg(long)]
        destination_path: String,

        /// Path and filename prefix for writing temporary files. ex: gs://MyBucket/tmp
        #[arg(long)]
        temp_prefix: String,

        /// Period of rotating tables (e.g. 168h); backs up only the currently active one
        #[arg(long, default_value = "0s")]
        periodic_table_duration: humantime::Duration,

        /// Dataflow region (overrides config)
        #[arg(long)]
        location: Option<String>,

        /// Wait for each export job to finish before starting the next
        #[arg(long)]
        wait: bool,

        /// Give up waiting for a job after this long (overrides config)
        #[arg(long, requires = "wait")]
        timeout: Option<humantime::Duration>,

        /// Keep backing up remaining tables when one fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// List the backups found under a backup path
    ListBackups {
        /// GCS path where backups can be found
        #[arg(long)]
        backup_path: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, ignore_case = true)]
        output: OutputFormat,
    },

    /// Restore backups of specific bigtableTableId created at a timestamp
    Restore {
        /// GCS path where backups can be found
        #[arg(long)]
        backup_path: String,

        /// The ID of the GCP project of the Cloud Bigtable instance that you want to write data to
        #[arg(long)]
        bigtable_project_id: String,

        /// The ID of the Cloud Bigtable instance that contains the table
        #[arg(long)]
        bigtable_instance_id: String,

        /// ID of the Cloud Bigtable table to restore
        #[arg(long)]
        bigtable_table_id: String,

        /// Path and filename prefix for writing temporary files. ex: gs://MyBucket/tmp
        #[arg(long)]
        temp_prefix: String,

        /// Timestamp of the backup to be restored. If not set, most recent backup would be restored
        #[arg(long)]
        backup_timestamp: Option<i64>,

        /// Dataflow region (overrides config)
        #[arg(long)]
        location: Option<String>,

        /// Wait for the import job to finish
        #[arg(long)]
        wait: bool,

        /// Give up waiting for the job after this long (overrides config)
        #[arg(long, requires = "wait")]
        timeout: Option<humantime::Duration>,
    },

    /// Delete backup of a table with timestamp
    DeleteBackup {
        /// ID of the bigtable table to delete its backup
        #[arg(long)]
        bigtable_table_id: String,

        /// GCS path where backups can be found
        #[arg(long)]
        backup_path: String,

        /// Timestamp of the backup to delete
        #[arg(long)]
        backup_timestamp: i64,
    },
}

/// Poll policy from config, with a command line timeout taking precedence.
fn poll_policy(config: &Config, timeout: Option<humantime::Duration>) -> Result<PollPolicy> {
    let mut policy = config
        .job
        .poll_policy()
        .context("Invalid job configuration")?;
    if let Some(timeout) = timeout {
        policy.timeout = Some(Duration::from(timeout));
    }
    Ok(policy)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting bigtable-backup v{}", env!("CARGO_PKG_VERSION"));

    let api = ApiClient::new(config.access_token());
    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signal(cancel.clone());

    let result = run(args.command, &config, api, &cancel).await;

    cancel.cancel();
    let _ = signals.await;

    result
}

async fn run(
    command: Command,
    config: &Config,
    api: ApiClient,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Create {
            bigtable_project_id,
            bigtable_instance_id,
            bigtable_table_id_prefix,
            destination_path,
            temp_prefix,
            periodic_table_duration,
            location,
            wait,
            timeout,
            continue_on_error,
        } => {
            let admin = BigtableAdminClient::new(api.clone(), &config.endpoints.bigtable_admin);
            let dataflow = DataflowClient::new(api, &config.endpoints.dataflow);
            let driver = JobDriver::new(&dataflow, poll_policy(config, timeout)?);

            let create_args = CreateBackupArgs {
                project_id: bigtable_project_id,
                instance_id: bigtable_instance_id,
                table_id_prefix: bigtable_table_id_prefix,
                destination_path,
                temp_prefix,
                periodic_table_duration: periodic_table_duration.into(),
                location: location.unwrap_or_else(|| config.job.location.clone()),
                export_template: config.templates.export.clone(),
                wait,
                policy: if continue_on_error {
                    BatchPolicy::ContinueOnError
                } else {
                    BatchPolicy::StopOnFirstError
                },
            };

            let now = chrono::Utc::now().timestamp();
            let handles = commands::create::execute(&admin, &driver, &create_args, now, cancel)
                .await
                .context("Error creating backups")?;

            println!("Created {} backup job(s) with timestamp {}", handles.len(), now);
        }
        Command::ListBackups {
            backup_path,
            output,
        } => {
            let storage = StorageClient::new(api, &config.endpoints.storage);

            let index = commands::list::execute(&storage, &backup_path, cancel)
                .await
                .context("Error listing backups")?;

            print!("{}", commands::list::render(&index, output)?);
        }
        Command::Restore {
            backup_path,
            bigtable_project_id,
            bigtable_instance_id,
            bigtable_table_id,
            temp_prefix,
            backup_timestamp,
            location,
            wait,
            timeout,
        } => {
            let storage = StorageClient::new(api.clone(), &config.endpoints.storage);
            let dataflow = DataflowClient::new(api, &config.endpoints.dataflow);
            let driver = JobDriver::new(&dataflow, poll_policy(config, timeout)?);

            let restore_args = RestoreBackupArgs {
                backup_path,
                project_id: bigtable_project_id,
                instance_id: bigtable_instance_id,
                table_id: bigtable_table_id,
                temp_prefix,
                // 0 has always meant "not set"
                backup_timestamp: backup_timestamp.filter(|timestamp| *timestamp != 0),
                location: location.unwrap_or_else(|| config.job.location.clone()),
                import_template: config.templates.import.clone(),
                wait,
            };

            commands::restore::execute(&storage, &driver, &restore_args, cancel)
                .await
                .context("Error restoring backup")?;
        }
        Command::DeleteBackup {
            bigtable_table_id,
            backup_path,
            backup_timestamp,
        } => {
            let storage = StorageClient::new(api, &config.endpoints.storage);

            let delete_args = DeleteBackupArgs {
                table_id: bigtable_table_id,
                backup_path,
                backup_timestamp,
            };

            commands::delete::execute(&storage, &delete_args, cancel)
                .await
                .context("Error deleting backup")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let args = Args::try_parse_from([
            "bigtable-backup",
            "create",
            "--bigtable-project-id",
            "proj",
            "--bigtable-instance-id",
            "inst",
            "--bigtable-table-id-prefix",
            "index_",
            "--destination-path",
            "gs://bucket/backups",
            "--temp-prefix",
            "gs://bucket/tmp",
            "--periodic-table-duration",
            "168h",
        ])
        .unwrap();

        match args.command {
            Command::Create {
                periodic_table_duration,
                wait,
                continue_on_error,
                ..
            } => {
                assert_eq!(
                    Duration::from(periodic_table_duration),
                    Duration::from_secs(168 * 3600)
                );
                assert!(!wait);
                assert!(!continue_on_error);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_output_flag() {
        let args = Args::try_parse_from([
            "bigtable-backup",
            "list-backups",
            "--backup-path",
            "gs://bucket",
            "-o",
            "JSON",
        ])
        .unwrap();

        assert!(matches!(
            args.command,
            Command::ListBackups {
                output: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_requires_wait() {
        let result = Args::try_parse_from([
            "bigtable-backup",
            "restore",
            "--backup-path",
            "gs://bucket",
            "--bigtable-project-id",
            "proj",
            "--bigtable-instance-id",
            "inst",
            "--bigtable-table-id",
            "t",
            "--temp-prefix",
            "gs://bucket/tmp",
            "--timeout",
            "1h",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_timeout_overrides_config() {
        let config = Config::default();
        let policy = poll_policy(&config, Some("90s".parse().unwrap())).unwrap();
        assert_eq!(policy.timeout, Some(Duration::from_secs(90)));
        assert_eq!(poll_policy(&config, None).unwrap().timeout, None);
    }

    #[test]
    fn test_invalid_job_config_fails_early() {
        let mut config = Config::default();
        config.job.poll_interval_secs = 0;
        assert!(poll_policy(&config, None).is_err());
    }
}
