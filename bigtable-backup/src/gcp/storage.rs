//! Cloud Storage JSON v1 client (object listing and deletion).

use super::{ApiClient, Object, ObjectStore};
use crate::paginate::Page;
use crate::{BackupError, Result};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

pub struct StorageClient {
    api: ApiClient,
    base_url: String,
}

impl StorageClient {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<String>,
    ) -> Result<Page<Object>> {
        let url = self
            .api
            .url(&self.base_url, &["storage", "v1", "b", bucket, "o"])?;

        let mut query = vec![("fields", "items(name),nextPageToken".to_string())];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        tracing::debug!(bucket, prefix, "Listing objects");
        let response: ListObjectsResponse = self
            .api
            .get_json(url, &query)
            .await
            .map_err(|e| {
                BackupError::Storage(format!("listing gs://{}/{}: {}", bucket, prefix, e))
            })?;

        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|object| Object { name: object.name })
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<()> {
        let url = self
            .api
            .url(&self.base_url, &["storage", "v1", "b", bucket, "o", name])?;

        self.api
            .delete(url)
            .await
            .map_err(|e| BackupError::Storage(format!("deleting gs://{}/{}: {}", bucket, name, e)))
    }
}
