//! Shared JSON-over-HTTP plumbing for the Google REST APIs.

use crate::{BackupError, Result};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Google APIs wrap failures as `{"error": {"code": .., "message": ..}}`.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// reqwest client plus the optional bearer token attached to every call.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
        }
    }

    /// Build `{base}/{segment}/{segment}...`, percent-encoding each segment.
    pub fn url(&self, base: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| BackupError::Config(format!("invalid endpoint '{}': {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| BackupError::Config(format!("endpoint '{}' cannot be a base", base)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.request(Method::GET, url).query(query).send().await?;
        Self::decode(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let response = self.request(Method::POST, url).json(body).send().await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, url: Url) -> Result<()> {
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => error.error.message,
            Err(_) => body,
        };

        Err(BackupError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let client = ApiClient::new(None);
        let url = client
            .url(
                "https://storage.googleapis.com",
                &["storage", "v1", "b", "bucket", "o", "backups/t/1/t:part-0"],
            )
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket/o/backups%2Ft%2F1%2Ft:part-0"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let client = ApiClient::new(None);
        let url = client
            .url("http://localhost:8086/emulator/", &["v2", "projects"])
            .unwrap();

        assert_eq!(url.as_str(), "http://localhost:8086/emulator/v2/projects");
    }

    #[test]
    fn test_invalid_endpoint() {
        let client = ApiClient::new(None);
        assert!(matches!(
            client.url("not a url", &["v1"]),
            Err(BackupError::Config(_))
        ));
    }
}
