use super::{DEFAULT_PAGE_SIZE, KeyPages, RegistryStorage};
use crate::{RegScanError, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use bytes::Bytes;
use futures_util::{StreamExt, stream};

/// RegistryStorage over one S3 bucket, speaking `ListObjectsV2` directly.
///
/// Keys are handed out exactly as S3 returns them. Keys with empty or `.`
/// segments are legal in S3 and must reach the classifier untouched.
pub struct S3Storage {
    bucket: String,
    client: Client,
    page_size: usize,
}

impl S3Storage {
    pub fn new(bucket: impl Into<String>, client: Client) -> Self {
        Self {
            bucket: bucket.into(),
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
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

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListObjectsV2Output> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(self.page_size as i32);

        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        request.send().await.map_err(|error| {
            RegScanError::S3(format!(
                "list {} failed: {}",
                prefix,
                DisplayErrorContext(&error)
            ))
        })
    }
}

/// Raw keys of one listing page. Entries without a key are dropped.
fn page_keys(output: &ListObjectsV2Output) -> Vec<String> {
    output
        .contents()
        .iter()
        .filter_map(|object| object.key())
        .map(str::to_string)
        .collect()
}

/// Token for the following page, or `None` when the listing is complete.
fn next_continuation(output: &ListObjectsV2Output) -> Option<String> {
    if !output.is_truncated().unwrap_or(false) {
        return None;
    }
    output.next_continuation_token().map(str::to_string)
}

enum ListState {
    Start,
    Continue(String),
    Done,
}

#[async_trait]
impl RegistryStorage for S3Storage {
    fn list_keys<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyPages<'a> {
        if let Err(error) = self.check_bucket(bucket) {
            return stream::once(async move { Err::<Vec<String>, _>(error) }).boxed();
        }

        stream::try_unfold(ListState::Start, move |state| async move {
            let continuation = match state {
                ListState::Start => None,
                ListState::Continue(token) => Some(token),
                ListState::Done => return Ok(None),
            };

            let output = self.list_page(prefix, continuation).await?;
            let next = match next_continuation(&output) {
                Some(token) => ListState::Continue(token),
                None => ListState::Done,
            };

            Ok(Some((page_keys(&output), next)))
        })
        .boxed()
    }

    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.check_bucket(bucket)?;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| match error.as_service_error() {
                Some(service) if service.is_no_such_key() => {
                    RegScanError::NotFound(key.to_string())
                }
                _ => RegScanError::S3(format!(
                    "get {} failed: {}",
                    key,
                    DisplayErrorContext(&error)
                )),
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|error| RegScanError::S3(format!("read {} failed: {}", key, error)))?;

        Ok(body.into_bytes())
    }
}
