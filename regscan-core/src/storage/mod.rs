//! Storage collaborators for Regscan
//!
//! Provides the listing/fetch contract the reconciler consumes, a native S3
//! implementation and an object_store backed one for local trees.

pub mod factory;
pub mod object_storage;
pub mod s3;

pub use factory::{DEFAULT_REGION, StorageBackend, StorageBuilder};
pub use object_storage::{DEFAULT_PAGE_SIZE, ObjectStoreStorage};
pub use s3::S3Storage;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Lazy sequence of listing pages. Each item is one backend page of keys.
pub type KeyPages<'a> = BoxStream<'a, Result<Vec<String>>>;

#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// Lists every key under `prefix`, one page at a time.
    ///
    /// Each call starts a fresh listing. An `Err` item means the listing
    /// itself failed and the remaining pages are unknown.
    fn list_keys<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyPages<'a>;

    /// Fetches the full body of one object.
    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<Bytes>;
}
