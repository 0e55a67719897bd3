//! S3-compatible object store
//!
//! Talks to any S3 API endpoint. The default is Cloud Storage's XML
//! interoperability endpoint, authenticated with HMAC keys, so artifacts
//! land where the warehouse can read them as `gs://` URIs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::ObjectStore;
use crate::config::StagingConfig;

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &StagingConfig, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let (access_key, secret_key) = config.resolved_credentials()?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "streamtally-staging");

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            "Staging store client initialized for bucket: {}",
            bucket
        );

        Ok(Self { client, bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self))]
    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        debug!("Uploading {} to s3://{}/{}", path.display(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(body)
            .send()
            .await
            .context("Failed to upload to object store")?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        debug!("Deleting s3://{}/{}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to delete from object store: {}", key))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("Failed to list objects")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects under s3://{}/{}", keys.len(), self.bucket, prefix);

        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_configured_credentials() {
        let config = StagingConfig {
            access_key: Some("GOOG1EXAMPLE".to_string()),
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };

        let store = S3ObjectStore::new(&config, "live-staging").unwrap();
        assert_eq!(store.bucket(), "live-staging");
    }

    #[test]
    fn test_new_requires_secret() {
        let config = StagingConfig {
            access_key: Some("GOOG1EXAMPLE".to_string()),
            secret_key: Some(String::new()),
            ..Default::default()
        };

        assert!(S3ObjectStore::new(&config, "live-staging").is_err());
    }
}
