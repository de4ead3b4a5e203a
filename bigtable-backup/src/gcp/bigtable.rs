//! Bigtable Admin v2 client (table listing only).

use super::{ApiClient, Table, TableAdmin};
use crate::paginate::Page;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTablesResponse {
    #[serde(default)]
    tables: Vec<TableResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    name: String,
}

pub struct BigtableAdminClient {
    api: ApiClient,
    base_url: String,
}

impl BigtableAdminClient {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TableAdmin for BigtableAdminClient {
    async fn list_tables(
        &self,
        project_id: &str,
        instance_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Table>> {
        let url = self.api.url(
            &self.base_url,
            &["v2", "projects", project_id, "instances", instance_id, "tables"],
        )?;

        // NAME_ONLY keeps the response small; only the names are used.
        let mut query = vec![("view", "NAME_ONLY".to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        tracing::debug!(project_id, instance_id, "Listing tables");
        let response: ListTablesResponse = self.api.get_json(url, &query).await?;

        Ok(Page {
            items: response
                .tables
                .into_iter()
                .map(|table| Table { name: table.name })
                .collect(),
            next_page_token: response.next_page_token,
        })
    }
}
