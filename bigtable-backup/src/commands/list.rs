//! `list-backups`: show every backup under a backup path.

use crate::gcp::ObjectStore;
use crate::index::BackupIndex;
use crate::paths::BackupRoot;
use crate::Result;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub async fn execute(
    store: &dyn ObjectStore,
    backup_path: &str,
    cancel: &CancellationToken,
) -> Result<BackupIndex> {
    let root = BackupRoot::parse(backup_path)?;
    BackupIndex::load(store, &root, cancel).await
}

pub fn render(index: &BackupIndex, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(index)?),
        OutputFormat::Text => Ok(render_text(index)),
    }
}

/// `table: ts1,ts2` per line under a header, ordered by table id.
fn render_text(index: &BackupIndex) -> String {
    if index.is_empty() {
        return "No backups found\n".to_string();
    }

    let mut out = String::from("TableName: Backup Timestamps\n");
    for table_id in index.table_ids() {
        let timestamps: Vec<String> = index
            .timestamps(table_id)
            .iter()
            .map(|t| t.to_string())
            .collect();
        let _ = writeln!(out, "{}: {}", table_id, timestamps.join(","));
    }
    out
}
