//! Regscan Core - orphan blob audit for container registry storage
//!
//! Reconciles the blobs stored under `<root>/blobs` with the digests named by
//! repository links under `<root>/repositories`:
//! - listing is page-by-page, native S3 or an object_store backend
//! - per-key anomalies are logged and skipped
//! - listing failures abort the whole run

pub mod error;
pub mod layout;
pub mod operations;
pub mod storage;

pub use error::{RegScanError, Result};
pub use layout::{
    DEFAULT_ROOT, DIGEST_ALGORITHMS, Digest, RegistryLayout, blob_data_key, digest_from_blob_key,
    digest_from_link_body, is_blob_key, is_link_key,
};
pub use operations::{
    BlobRecord, DEFAULT_LINK_FETCH_CONCURRENCY, ReconcileOperation, ReconcileOperationRequest,
    ReconcileOperationResult, ReconcileStats, ReconciliationResult, reconcile,
};
pub use storage::{
    DEFAULT_PAGE_SIZE, DEFAULT_REGION, KeyPages, ObjectStoreStorage, RegistryStorage,
    S3Storage, StorageBackend, StorageBuilder,
};
