//! HTTP client for a GCS JSON API compatible object store.

use serde::Deserialize;
use silo_types::{BlobStore, BlobStoreError};

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Connection settings for the object-storage API.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl StorageConfig {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Reads `SILO_STORAGE_URL` and `SILO_TOKEN`.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("SILO_STORAGE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = std::env::var("SILO_TOKEN").ok();
        Self::new(&base_url, token)
    }
}

/// Blob store over one bucket of a GCS-compatible endpoint.
pub struct RestBlobStore {
    client: reqwest::Client,
    config: StorageConfig,
    bucket: String,
}

impl RestBlobStore {
    pub fn new(config: StorageConfig, bucket: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            bucket: bucket.to_string(),
        }
    }

    pub fn from_env(bucket: &str) -> Self {
        Self::new(StorageConfig::from_env(), bucket)
    }

    /// Object names may contain `/`; they travel percent-encoded as one path segment.
    fn object_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.base_url,
            self.bucket,
            urlencoding::encode(object)
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for RestBlobStore {
    async fn exists(&self, object: &str) -> Result<bool, BlobStoreError> {
        let res = self
            .authorize(self.client.get(self.object_url(object)))
            .send()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        match res.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(api_error(s, &res.text().await.unwrap_or_default())),
        }
    }

    async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.base_url, self.bucket
        );
        let size = bytes.len();
        let res = self
            .authorize(
                self.client
                    .post(&url)
                    .query(&[("uploadType", "media"), ("name", object)])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes),
            )
            .send()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(api_error(status, &res.text().await.unwrap_or_default()));
        }
        tracing::info!(bucket = %self.bucket, object, size, "uploaded object");
        Ok(())
    }

    async fn download(&self, object: &str) -> Result<Vec<u8>, BlobStoreError> {
        let url = format!("{}?alt=media", self.object_url(object));
        let res = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobStoreError::NotFound(object.to_string()));
        }
        if !status.is_success() {
            return Err(api_error(status, &res.text().await.unwrap_or_default()));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let url = format!("{}/storage/v1/b/{}/o", self.config.base_url, self.bucket);
        let mut req = self.client.get(&url);
        if !prefix.is_empty() {
            req = req.query(&[("prefix", prefix)]);
        }
        let res = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        let listing: ObjectListing = serde_json::from_str(&body)
            .map_err(|e| BlobStoreError::Other(format!("list decode: {}", e)))?;
        Ok(listing.items.into_iter().map(|o| o.name).collect())
    }
}

#[derive(Deserialize)]
struct ObjectListing {
    #[serde(default)]
    items: Vec<ObjectEntry>,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

fn api_error(status: reqwest::StatusCode, body: &str) -> BlobStoreError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    BlobStoreError::Api {
        status: status.as_u16(),
        message,
    }
}
