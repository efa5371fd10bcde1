//! Supabase Storage REST client.

use async_trait::async_trait;
use crumb_core::{ObjectStorage, StorageError, UploadTarget};
use reqwest::Client;
use serde::Deserialize;

use crate::app_config::StorageConfig;

#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SignedUploadResponse {
    #[serde(alias = "signedURL")]
    url: String,
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            http: Client::new(),
        }
    }

    /// Signed URLs come back relative to the storage root.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

fn request_err(err: reqwest::Error) -> StorageError {
    StorageError::Request(err.to_string())
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn generate_upload_url(&self, bucket: &str, path: &str) -> Result<UploadTarget, StorageError> {
        let url = format!("{}/object/upload/sign/{}/{}", self.base_url, bucket, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(request_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(StorageError::UnexpectedResponse(format!(
                "sign upload for {bucket}/{path} failed with status {status}: {text}"
            )));
        }

        let parsed: SignedUploadResponse = response.json().await.map_err(request_err)?;

        Ok(UploadTarget {
            upload_url: self.resolve(&parsed.url),
            public_url: self.public_url(bucket, path),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, bucket, path)
    }

    async fn remove_file(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        let url = format!("{}/object/{}/{}", self.base_url, bucket, path);

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await
            .map_err(request_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(StorageError::UnexpectedResponse(format!(
                "remove {bucket}/{path} failed with status {status}: {text}"
            )));
        }

        Ok(())
    }
}
