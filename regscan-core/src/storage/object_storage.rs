use super::{KeyPages, RegistryStorage};
use crate::{RegScanError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use object_store::ObjectStore;
use object_store::path::Path;
use std::sync::Arc;

/// Page size of an S3 `ListObjects` call.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// RegistryStorage over a single bucket of any object_store backend.
pub struct ObjectStoreStorage {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    page_size: usize,
}

impl ObjectStoreStorage {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_bucket(&self, bucket: &str) -> Result<()> {
        if bucket != self.bucket {
            return Err(RegScanError::Config(format!(
                "storage is bound to bucket '{}', got '{}'",
                self.bucket, bucket
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStorage for ObjectStoreStorage {
    fn list_keys<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyPages<'a> {
        if let Err(error) = self.check_bucket(bucket) {
            return stream::once(async move { Err::<Vec<String>, _>(error) }).boxed();
        }

        let prefix = prefix.trim_matches('/');
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));

        self.store
            .list(prefix.as_ref())
            .chunks(self.page_size)
            .map(|page| {
                page.into_iter()
                    .map(|meta| {
                        meta.map(|meta| meta.location.to_string())
                            .map_err(RegScanError::from)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .boxed()
    }

    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.check_bucket(bucket)?;

        let location = Path::parse(key)
            .map_err(|error| RegScanError::InvalidKey(format!("{}: {}", key, error)))?;

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|error| RegScanError::from_object_store(key, error))?;

        result
            .bytes()
            .await
            .map_err(|error| RegScanError::from_object_store(key, error))
    }
}
