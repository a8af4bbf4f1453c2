//! Artifact storage over `object_store`.
//!
//! S3-compatible storage (AWS, Garage, MinIO) in deployments, in-memory for
//! tests and local runs.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::debug;

use super::BaseBlobStore;
use crate::config::StorageConfig;

#[derive(Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    backend: &'static str,
}

impl ObjectBlobStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(region)
                    .with_allow_http(*allow_http);

                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }

                let s3 = builder.build().context("failed to build S3 client")?;
                Ok(Self {
                    store: Arc::new(s3),
                    backend: "s3",
                })
            }
            StorageConfig::Memory => Ok(Self::in_memory()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            backend: "memory",
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Read an object back (tests and tooling).
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let path = to_path(key)?;
        let result = self
            .store
            .get(&path)
            .await
            .with_context(|| format!("failed to read {}", key))?;
        Ok(result.bytes().await?)
    }
}

fn to_path(key: &str) -> Result<Path> {
    let key = key.trim_start_matches('/');
    if key.is_empty() {
        bail!("object key must not be empty");
    }
    Ok(Path::from(key))
}

#[async_trait]
impl BaseBlobStore for ObjectBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let path = to_path(key)?;
        let size = body.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, PutPayload::from(body), options)
            .await
            .with_context(|| format!("failed to write {} to {} storage", key, self.backend))?;

        debug!(key = %key, bytes = size, content_type = %content_type, "stored artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_put_then_get() {
        let store = ObjectBlobStore::in_memory();
        store
            .put("scraper/a/b.html", Bytes::from_static(b"Hi"), "text/html")
            .await
            .unwrap();

        assert_eq!(store.get("scraper/a/b.html").await.unwrap(), Bytes::from_static(b"Hi"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = ObjectBlobStore::in_memory();
        store.put("k.json", Bytes::from_static(b"{}"), "application/json").await.unwrap();
        store
            .put("k.json", Bytes::from_static(b"{\"a\":1}"), "application/json")
            .await
            .unwrap();

        assert_eq!(store.get("k.json").await.unwrap(), Bytes::from_static(b"{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = ObjectBlobStore::in_memory();
        assert!(store.put("/", Bytes::new(), "text/html").await.is_err());
    }

    #[test]
    fn test_s3_config_builds_without_network() {
        let store = ObjectBlobStore::from_config(&StorageConfig::S3 {
            bucket: "scraper".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:3900".to_string()),
            access_key_id: Some("GKtest".to_string()),
            secret_access_key: Some("secret".to_string()),
            allow_http: true,
        })
        .unwrap();
        assert_eq!(store.backend(), "s3");
    }
}
