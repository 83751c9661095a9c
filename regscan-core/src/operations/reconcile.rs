use crate::layout::{
    Digest, RegistryLayout, digest_from_blob_key, digest_from_link_body, is_blob_key, is_link_key,
};
use crate::storage::{KeyPages, RegistryStorage};
use crate::{RegScanError, Result};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LINK_FETCH_CONCURRENCY: usize = 16;

/// Reachability state of one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobRecord {
    pub digest: Digest,
    pub referenced: bool,
}

/// Every blob discovered in one run, keyed by digest.
///
/// Links only flip existing entries; they never add one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    blobs: BTreeMap<Digest, BlobRecord>,
}

impl ReconciliationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins discovered blob digests with resolved link targets, without I/O.
    pub fn merge<B, L>(blob_digests: B, link_targets: L) -> Self
    where
        B: IntoIterator<Item = Digest>,
        L: IntoIterator<Item = Digest>,
    {
        let mut result = Self::new();
        for digest in blob_digests {
            result.insert_blob(digest);
        }
        for digest in link_targets {
            result.mark_referenced(&digest);
        }
        result
    }

    /// Records a blob as unreferenced, replacing any entry for the same digest.
    pub fn insert_blob(&mut self, digest: Digest) {
        self.blobs.insert(
            digest.clone(),
            BlobRecord {
                digest,
                referenced: false,
            },
        );
    }

    /// Marks a known blob as referenced. Returns false for unknown digests.
    pub fn mark_referenced(&mut self, digest: &Digest) -> bool {
        match self.blobs.get_mut(digest) {
            Some(record) => {
                record.referenced = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, digest: &Digest) -> Option<&BlobRecord> {
        self.blobs.get(digest)
    }

    /// Records in digest order.
    pub fn iter(&self) -> impl Iterator<Item = &BlobRecord> {
        self.blobs.values()
    }

    pub fn orphans(&self) -> impl Iterator<Item = &BlobRecord> {
        self.iter().filter(|record| !record.referenced)
    }

    pub fn total_blobs(&self) -> usize {
        self.blobs.len()
    }

    pub fn referenced_blobs(&self) -> usize {
        self.iter().filter(|record| record.referenced).count()
    }

    pub fn orphan_blobs(&self) -> usize {
        self.total_blobs() - self.referenced_blobs()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Counters for keys and links that were tolerated rather than applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub pages_listed: usize,
    pub blob_keys: usize,
    pub malformed_blob_keys: usize,
    pub link_keys: usize,
    pub resolved_links: usize,
    pub dangling_links: usize,
    pub unreadable_links: usize,
    pub skipped_keys: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOperationRequest {
    pub bucket: String,
    pub layout: RegistryLayout,
    pub link_fetch_concurrency: usize,
    /// Upper bound on waiting for a single listing page.
    pub list_timeout: Option<Duration>,
}

impl ReconcileOperationRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            layout: RegistryLayout::default(),
            link_fetch_concurrency: DEFAULT_LINK_FETCH_CONCURRENCY,
            list_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOperationResult {
    pub blobs: ReconciliationResult,
    pub stats: ReconcileStats,
}

#[derive(Clone)]
pub struct ReconcileOperation {
    storage: Arc<dyn RegistryStorage>,
}

impl ReconcileOperation {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self { storage }
    }

    pub async fn run(&self, request: ReconcileOperationRequest) -> Result<ReconcileOperationResult> {
        let mut blobs = ReconciliationResult::new();
        let mut stats = ReconcileStats::default();

        // links resolve against the blob universe, so blobs must be complete first
        self.discover_blobs(&request, &mut blobs, &mut stats).await?;
        tracing::info!(
            "Blob discovery finished. bucket={} blobs={} malformed={}",
            request.bucket,
            blobs.total_blobs(),
            stats.malformed_blob_keys
        );

        self.resolve_links(&request, &mut blobs, &mut stats).await?;
        tracing::info!(
            "Link resolution finished. bucket={} links={} resolved={} dangling={} unreadable={}",
            request.bucket,
            stats.link_keys,
            stats.resolved_links,
            stats.dangling_links,
            stats.unreadable_links
        );

        Ok(ReconcileOperationResult { blobs, stats })
    }

    async fn discover_blobs(
        &self,
        request: &ReconcileOperationRequest,
        blobs: &mut ReconciliationResult,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        let prefix = request.layout.blobs_prefix();
        let mut pages = self.storage.list_keys(&request.bucket, &prefix);

        while let Some(page) = next_page(&mut pages, &prefix, request.list_timeout).await? {
            stats.pages_listed += 1;
            for key in &page {
                record_blob_key(blobs, stats, key);
            }
            tracing::debug!(
                "Listed blob page. keys={} blobs_so_far={}",
                page.len(),
                blobs.total_blobs()
            );
        }

        Ok(())
    }

    async fn resolve_links(
        &self,
        request: &ReconcileOperationRequest,
        blobs: &mut ReconciliationResult,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        let storage = self.storage.as_ref();
        let bucket = request.bucket.as_str();
        let concurrency = request.link_fetch_concurrency.max(1);
        let prefix = request.layout.repositories_prefix();
        let mut pages = storage.list_keys(bucket, &prefix);

        while let Some(page) = next_page(&mut pages, &prefix, request.list_timeout).await? {
            stats.pages_listed += 1;

            let mut link_keys = Vec::new();
            for key in page {
                if is_link_key(&key) {
                    link_keys.push(key);
                } else {
                    stats.skipped_keys += 1;
                }
            }
            stats.link_keys += link_keys.len();

            let mut fetches = stream::iter(link_keys)
                .map(move |key| async move {
                    let body = storage.get_object_body(bucket, &key).await;
                    (key, body)
                })
                .buffer_unordered(concurrency);

            while let Some((key, body)) = fetches.next().await {
                apply_link_body(blobs, stats, &key, body);
            }
        }

        Ok(())
    }
}

/// Runs a reconciliation with default options.
pub async fn reconcile(
    storage: Arc<dyn RegistryStorage>,
    bucket: impl Into<String>,
) -> Result<ReconciliationResult> {
    let result = ReconcileOperation::new(storage)
        .run(ReconcileOperationRequest::new(bucket))
        .await?;
    Ok(result.blobs)
}

async fn next_page(
    pages: &mut KeyPages<'_>,
    prefix: &str,
    timeout: Option<Duration>,
) -> Result<Option<Vec<String>>> {
    let next = match timeout {
        Some(limit) => tokio::time::timeout(limit, pages.next())
            .await
            .map_err(|_| {
                RegScanError::Timeout(format!(
                    "listing page under {} took longer than {:?}",
                    prefix, limit
                ))
            })?,
        None => pages.next().await,
    };

    next.transpose()
}

fn record_blob_key(blobs: &mut ReconciliationResult, stats: &mut ReconcileStats, key: &str) {
    if !is_blob_key(key) {
        stats.skipped_keys += 1;
        return;
    }
    stats.blob_keys += 1;

    match digest_from_blob_key(key) {
        Ok(digest) => blobs.insert_blob(digest),
        Err(error) => {
            stats.malformed_blob_keys += 1;
            tracing::warn!("Skipping malformed blob key. key={} error={}", key, error);
        }
    }
}

fn apply_link_body(
    blobs: &mut ReconciliationResult,
    stats: &mut ReconcileStats,
    key: &str,
    body: Result<Bytes>,
) {
    let body = match body {
        Ok(body) => body,
        Err(error) => {
            stats.unreadable_links += 1;
            tracing::warn!("Skipping unreadable link. key={} error={}", key, error);
            return;
        }
    };

    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(error) => {
            stats.unreadable_links += 1;
            tracing::warn!("Skipping non UTF-8 link. key={} error={}", key, error);
            return;
        }
    };

    let digest = digest_from_link_body(text);
    if blobs.mark_referenced(&digest) {
        stats.resolved_links += 1;
    } else {
        stats.dangling_links += 1;
        tracing::debug!("Link points at unknown blob. key={} digest={}", key, digest);
    }
}
