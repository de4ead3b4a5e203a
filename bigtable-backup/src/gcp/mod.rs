//! Clients for the Google Cloud services the tool drives.
//!
//! Each service sits behind a small trait so the orchestration logic can run
//! against in-memory fakes in tests:
//! - [`TableAdmin`]: Bigtable Admin table listing
//! - [`ObjectStore`]: Cloud Storage object listing and deletion
//! - [`JobService`]: Dataflow template launches and job status

pub mod bigtable;
pub mod dataflow;
pub mod http;
pub mod storage;

#[cfg(test)]
pub mod fake;

use crate::job::JobSpec;
use crate::paginate::{paginate, Page};
use crate::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use bigtable::BigtableAdminClient;
pub use dataflow::DataflowClient;
pub use http::ApiClient;
pub use storage::StorageClient;

/// A table as returned by the admin API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Fully qualified name: `projects/{p}/instances/{i}/tables/{id}`
    pub name: String,
}

impl Table {
    /// Short table id, the last segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// An object as returned by the storage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub name: String,
}

/// A Dataflow job reference plus the last state the service reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Raw `JOB_STATE_*` value; absent right after submission
    pub current_state: Option<String>,
}

#[async_trait]
pub trait TableAdmin: Send + Sync {
    /// List one page of tables under `projects/{project}/instances/{instance}`.
    async fn list_tables(
        &self,
        project_id: &str,
        instance_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Table>>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects in `bucket` whose names start with `prefix`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<String>,
    ) -> Result<Page<Object>>;

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<()>;
}

#[async_trait]
pub trait JobService: Send + Sync {
    /// Launch a job from a template.
    async fn create_job_from_template(&self, project_id: &str, spec: &JobSpec) -> Result<Job>;

    async fn get_job(&self, project_id: &str, location: &str, job_id: &str) -> Result<Job>;
}

/// Every table in an instance, page by page.
pub fn all_tables<'a>(
    admin: &'a dyn TableAdmin,
    project_id: &'a str,
    instance_id: &'a str,
) -> BoxStream<'a, Result<Table>> {
    paginate(move |token| admin.list_tables(project_id, instance_id, token))
}

/// Every object under `prefix`, page by page.
pub fn all_objects<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: &'a str,
) -> BoxStream<'a, Result<Object>> {
    paginate(move |token| store.list_objects(bucket, prefix, token))
}
