//! Dataflow v1b3 client (template launches and job status).

use super::{ApiClient, Job, JobService};
use crate::job::JobSpec;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `projects.locations.templates.create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobFromTemplateRequest<'a> {
    job_name: &'a str,
    gcs_path: &'a str,
    parameters: &'a BTreeMap<String, String>,
    environment: RuntimeEnvironment<'a>,
    location: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeEnvironment<'a> {
    temp_location: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    current_state: Option<String>,
}

impl From<JobResource> for Job {
    fn from(job: JobResource) -> Self {
        Job {
            id: job.id,
            name: job.name,
            current_state: job.current_state,
        }
    }
}

pub struct DataflowClient {
    api: ApiClient,
    base_url: String,
}

impl DataflowClient {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl JobService for DataflowClient {
    async fn create_job_from_template(&self, project_id: &str, spec: &JobSpec) -> Result<Job> {
        let url = self.api.url(
            &self.base_url,
            &[
                "v1b3",
                "projects",
                project_id,
                "locations",
                spec.location.as_str(),
                "templates",
            ],
        )?;

        let request = CreateJobFromTemplateRequest {
            job_name: &spec.job_name,
            gcs_path: &spec.template_path,
            parameters: &spec.parameters,
            environment: RuntimeEnvironment {
                temp_location: &spec.temp_location,
            },
            location: &spec.location,
        };

        let job: JobResource = self.api.post_json(url, &request).await?;
        Ok(job.into())
    }

    async fn get_job(&self, project_id: &str, location: &str, job_id: &str) -> Result<Job> {
        let url = self.api.url(
            &self.base_url,
            &["v1b3", "projects", project_id, "locations", location, "jobs", job_id],
        )?;

        let job: JobResource = self
            .api
            .get_json(url, &[("view", "JOB_VIEW_SUMMARY".to_string())])
            .await?;
        Ok(job.into())
    }
}
