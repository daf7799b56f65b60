//! Supabase Storage client for page images.
//!
//! Uploads rendered page JPEGs at `{document_id}/page_{N}.jpg` with upsert
//! semantics and returns the public URL used in citations.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, TutorError};
use crate::traits::store::BlobStore;

const BUCKET_NAME: &str = "maritime-docs";
const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Supabase Storage REST client.
#[derive(Clone)]
pub struct SupabaseStorage {
    http_client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: BUCKET_NAME.to_string(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    fn object_path(document_id: &str, page_number: i32) -> String {
        format!("{}/page_{}.jpg", document_id, page_number)
    }

    /// Public URL for an uploaded object.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn upload_once(&self, path: &str, jpeg_bytes: &[u8]) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "image/jpeg")
            .header("x-upsert", "true")
            .body(jpeg_bytes.to_vec())
            .send()
            .await
            .map_err(|e| TutorError::Blob(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TutorError::Blob(format!(
                "upload failed ({}): {}",
                status, error_text
            )));
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Entry {
            name: String,
        }

        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({ "prefix": prefix, "limit": 1000 }))
            .send()
            .await
            .map_err(|e| TutorError::Blob(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TutorError::Blob(format!("list failed: {}", error_text)));
        }

        let entries: Vec<Entry> = response
            .json()
            .await
            .map_err(|e| TutorError::Blob(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|e| format!("{}/{}", prefix, e.name))
            .collect())
    }

    async fn delete_objects(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .http_client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|e| TutorError::Blob(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TutorError::Blob(format!("delete failed: {}", error_text)));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn upload_page_image(
        &self,
        document_id: &str,
        page_number: i32,
        jpeg_bytes: &[u8],
    ) -> Result<String> {
        let path = Self::object_path(document_id, page_number);

        let mut last_error = None;
        for attempt in 1..=MAX_RETRIES {
            match self.upload_once(&path, jpeg_bytes).await {
                Ok(()) => {
                    debug!(path = %path, size = jpeg_bytes.len(), "uploaded page image");
                    return Ok(self.public_url(&path));
                }
                Err(err) => {
                    warn!(path = %path, attempt, error = %err, "page image upload failed");
                    last_error = Some(err);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TutorError::Blob("upload failed".into())))
    }

    async fn delete_page_image(&self, document_id: &str, page_number: i32) -> Result<()> {
        self.delete_objects(&[Self::object_path(document_id, page_number)])
            .await
    }

    async fn delete_document_images(&self, document_id: &str) -> Result<usize> {
        let paths = self.list_objects(document_id).await?;
        let count = paths.len();
        self.delete_objects(&paths).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_layout() {
        assert_eq!(
            SupabaseStorage::object_path("colregs-vn", 12),
            "colregs-vn/page_12.jpg"
        );
    }

    #[test]
    fn test_public_url() {
        let storage = SupabaseStorage::new("https://proj.supabase.co/", "key");
        assert_eq!(
            storage.public_url("colregs-vn/page_1.jpg"),
            "https://proj.supabase.co/storage/v1/object/public/maritime-docs/colregs-vn/page_1.jpg"
        );
    }
}
