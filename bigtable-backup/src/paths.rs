//! Cloud Storage path handling for backups.
//!
//! Every backup lives at `{bucket}/{prefix}{table_id}/{timestamp}/` and the
//! export job writes its shards as `{table_id}:{shard}` below that directory.
//! Create, list, restore and delete all depend on this layout.

use crate::{BackupError, Result};
use std::fmt;

const GCS_SCHEME: &str = "gs://";

/// Separator between the table id and the shard name in exported file names.
pub const TABLE_ID_SEPARATOR: &str = ":";

/// A bucket plus an object prefix under which backups of many tables live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRoot {
    bucket: String,
    prefix: String,
}

impl BackupRoot {
    /// Parse a user supplied path such as `gs://bucket/some/folder`.
    ///
    /// The prefix always ends with `/` unless it is empty. Only an empty
    /// bucket is rejected; anything else is left for Cloud Storage to judge.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.strip_prefix(GCS_SCHEME).unwrap_or(path);

        let (bucket, prefix) = match path.split_once('/') {
            Some((bucket, "")) => (bucket, String::new()),
            Some((bucket, rest)) => {
                let prefix = if rest.ends_with('/') {
                    rest.to_string()
                } else {
                    format!("{}/", rest)
                };
                (bucket, prefix)
            }
            None => (path, String::new()),
        };

        if bucket.is_empty() {
            return Err(BackupError::InvalidInput(format!(
                "backup path '{}' has no bucket",
                path
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object name prefix of a single backup: `{prefix}{table_id}/{timestamp}/`.
    pub fn backup_object_prefix(&self, table_id: &str, timestamp: i64) -> String {
        format!("{}{}/{}/", self.prefix, table_id, timestamp)
    }

    /// Full `gs://` directory of a single backup.
    pub fn backup_path(&self, table_id: &str, timestamp: i64) -> String {
        format!(
            "{}{}/{}",
            GCS_SCHEME,
            self.bucket,
            self.backup_object_prefix(table_id, timestamp)
        )
    }

    /// Glob matching every shard an export of `table_id` wrote at `timestamp`.
    pub fn source_pattern(&self, table_id: &str, timestamp: i64) -> String {
        format!(
            "{}{}*",
            self.backup_path(table_id, timestamp),
            export_file_prefix(table_id)
        )
    }
}

impl fmt::Display for BackupRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", GCS_SCHEME, self.bucket, self.prefix)
    }
}

/// File name prefix handed to the export template for `table_id`.
pub fn export_file_prefix(table_id: &str) -> String {
    format!("{}{}", table_id, TABLE_ID_SEPARATOR)
}

/// Recover `(table_id, timestamp)` from an object name listed under `prefix`.
///
/// Returns `None` for anything that is not a backup shard: names outside the
/// prefix, names with fewer than three segments, directory markers (empty
/// third segment) and non-numeric timestamps.
pub fn parse_object_name(prefix: &str, name: &str) -> Option<(String, i64)> {
    let rest = name.strip_prefix(prefix)?;

    let mut segments = rest.splitn(3, '/');
    let table_id = segments.next()?;
    let timestamp = segments.next()?;
    let marker = segments.next()?;

    if marker.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // An empty segment matches `^[0-9]*$` but cannot be a timestamp, and
    // neither can anything that overflows i64.
    let timestamp = timestamp.parse::<i64>().ok()?;
    Some((table_id.to_string(), timestamp))
}
