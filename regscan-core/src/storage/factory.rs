use super::{ObjectStoreStorage, RegistryStorage, S3Storage};
use crate::{RegScanError, Result};
use aws_config::{BehaviorVersion, Region};
use object_store::local::LocalFileSystem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Filesystem,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Filesystem => "filesystem",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "filesystem" | "fs" | "file" => Ok(Self::Filesystem),
            "" => Err(RegScanError::Config(
                "storage backend cannot be empty".to_string(),
            )),
            other => Err(RegScanError::Config(format!(
                "unsupported storage backend: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageBuilder {
    backend: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    allow_http: bool,
    path: Option<String>,
    page_size: Option<usize>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    fn resolve_backend(&self) -> Result<StorageBackend> {
        StorageBackend::parse(self.backend.as_deref().unwrap_or_default())
    }

    fn resolve_bucket(&self) -> Option<String> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Bucket name the built storage answers to.
    ///
    /// For the filesystem backend the directory path doubles as the bucket.
    pub fn resolve_bucket_name(&self) -> Result<String> {
        match self.resolve_backend()? {
            StorageBackend::S3 => self.resolve_bucket().ok_or_else(|| {
                RegScanError::Config("bucket is required for s3 backend".to_string())
            }),
            StorageBackend::Filesystem => match self.resolve_bucket() {
                Some(bucket) => Ok(bucket),
                None => self.resolve_path(),
            },
        }
    }

    fn resolve_path(&self) -> Result<String> {
        let path = self.path.as_deref().unwrap_or_default().trim();
        if path.is_empty() {
            return Err(RegScanError::Config(
                "path is required for filesystem backend".to_string(),
            ));
        }
        Ok(path.to_string())
    }

    fn resolve_endpoint(&self) -> Result<Option<String>> {
        let Some(endpoint) = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };

        if endpoint.starts_with("http://") && !self.allow_http {
            return Err(RegScanError::Config(format!(
                "endpoint {} uses plain http; enable allow_http to use it",
                endpoint
            )));
        }
        Ok(Some(endpoint.to_string()))
    }

    pub async fn build(&self) -> Result<Arc<dyn RegistryStorage>> {
        let backend = self.resolve_backend()?;
        let bucket = self.resolve_bucket_name()?;

        match backend {
            StorageBackend::S3 => {
                let region = self
                    .region
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .unwrap_or(DEFAULT_REGION)
                    .to_string();
                let endpoint = self.resolve_endpoint()?;

                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()));
                if let Some(endpoint) = &endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared_config = loader.load().await;

                // custom endpoints (MinIO and friends) rarely resolve virtual-hosted buckets
                let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
                    .force_path_style(endpoint.is_some())
                    .build();

                tracing::debug!(
                    "Building s3 storage. bucket={} region={} endpoint={:?}",
                    bucket,
                    region,
                    endpoint
                );

                let mut storage =
                    S3Storage::new(bucket, aws_sdk_s3::Client::from_conf(s3_config));
                if let Some(page_size) = self.page_size {
                    storage = storage.with_page_size(page_size);
                }
                Ok(Arc::new(storage))
            }
            StorageBackend::Filesystem => {
                let path = self.resolve_path()?;
                tracing::debug!("Building filesystem storage. path={}", path);

                let store = Arc::new(LocalFileSystem::new_with_prefix(&path)?);
                let mut storage = ObjectStoreStorage::new(bucket, store);
                if let Some(page_size) = self.page_size {
                    storage = storage.with_page_size(page_size);
                }
                Ok(Arc::new(storage))
            }
        }
    }
}
