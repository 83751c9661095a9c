use regscan_core::{
    DEFAULT_LINK_FETCH_CONCURRENCY, DEFAULT_PAGE_SIZE, DEFAULT_REGION, DEFAULT_ROOT,
    ReconcileOperationRequest, RegScanError, RegistryLayout, Result, StorageBackend,
    StorageBuilder,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Where the registry data lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Directory for the filesystem backend
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: None,
            region: default_region(),
            endpoint: None,
            allow_http: false,
            path: None,
            root: default_root(),
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_link_fetch_concurrency")]
    pub link_fetch_concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub list_timeout_secs: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            link_fetch_concurrency: default_link_fetch_concurrency(),
            page_size: default_page_size(),
            list_timeout_secs: None,
        }
    }
}

fn default_link_fetch_concurrency() -> usize {
    DEFAULT_LINK_FETCH_CONCURRENCY
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Config {
    /// Loads the optional config file, then `REGSCAN_*` environment overrides
    /// (nested keys joined by `__`, e.g. `REGSCAN_STORAGE__BUCKET`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("REGSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RegScanError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| RegScanError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn storage_builder(&self) -> StorageBuilder {
        let storage = &self.storage;
        let mut builder = StorageBuilder::new()
            .backend(storage.backend.as_str())
            .region(storage.region.clone())
            .allow_http(storage.allow_http)
            .page_size(self.scan.page_size);

        if let Some(bucket) = &storage.bucket {
            builder = builder.bucket(bucket.clone());
        }
        if let Some(endpoint) = &storage.endpoint {
            builder = builder.endpoint(endpoint.clone());
        }
        if let Some(path) = &storage.path {
            builder = builder.path(path.clone());
        }

        builder
    }

    pub fn reconcile_request(&self, bucket: impl Into<String>) -> ReconcileOperationRequest {
        let mut request = ReconcileOperationRequest::new(bucket);
        request.layout = RegistryLayout::new(self.storage.root.clone());
        request.link_fetch_concurrency = self.scan.link_fetch_concurrency.max(1);
        request.list_timeout = self
            .scan
            .list_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.root, "docker/registry/v2");
        assert_eq!(config.scan.link_fetch_concurrency, 16);
        assert_eq!(config.scan.page_size, 1000);

        let request = config.reconcile_request("bucket");
        assert_eq!(request.bucket, "bucket");
        assert_eq!(request.layout.blobs_prefix(), "docker/registry/v2/blobs");
        assert!(request.list_timeout.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("regscan.toml");
        std::fs::write(
            &path,
            r#"
[storage]
backend = "filesystem"
path = "/var/lib/registry"
root = "mirror/v2"

[scan]
link_fetch_concurrency = 4
list_timeout_secs = 30
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(config.storage.path.as_deref(), Some("/var/lib/registry"));
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.scan.page_size, 1000);

        let request = config.reconcile_request("local");
        assert_eq!(request.layout.repositories_prefix(), "mirror/v2/repositories");
        assert_eq!(request.link_fetch_concurrency, 4);
        assert_eq!(request.list_timeout, Some(Duration::from_secs(30)));

        let bucket = config.storage_builder().resolve_bucket_name().unwrap();
        assert_eq!(bucket, "/var/lib/registry");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Config::load(Some("/nonexistent/regscan.toml"));
        assert!(matches!(result, Err(RegScanError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut config = Config::default();
        config.scan.list_timeout_secs = Some(0);
        config.scan.link_fetch_concurrency = 0;

        let request = config.reconcile_request("bucket");
        assert!(request.list_timeout.is_none());
        assert_eq!(request.link_fetch_concurrency, 1);
    }
}
