//! Key layout of the registry storage namespace.
//!
//! Blob data lives at `<root>/blobs/<algorithm>/<shard>/<digest>/data` and
//! repository links at `<root>/repositories/<name>/.../link`. Everything here
//! is pure string handling; no I/O.

use crate::{RegScanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ROOT: &str = "docker/registry/v2";

const BLOBS_SEGMENT: &str = "blobs";
const REPOSITORIES_SEGMENT: &str = "repositories";
const BLOB_DATA_SUFFIX: &str = "/data";
const LINK_SUFFIX: &str = "/link";

/// Digest algorithms whose `<algorithm>:` prefix is stripped from link bodies.
pub const DIGEST_ALGORITHMS: [&str; 3] = ["sha256", "sha384", "sha512"];

/// Bare content digest, as it appears in blob key paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Root directory of the registry inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLayout {
    root: String,
}

impl Default for RegistryLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl RegistryLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn blobs_prefix(&self) -> String {
        self.join(BLOBS_SEGMENT)
    }

    pub fn repositories_prefix(&self) -> String {
        self.join(REPOSITORIES_SEGMENT)
    }

    fn join(&self, segment: &str) -> String {
        if self.root.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.root, segment)
        }
    }
}

pub fn is_blob_key(key: &str) -> bool {
    key.contains(BLOBS_SEGMENT) && key.ends_with(BLOB_DATA_SUFFIX)
}

pub fn is_link_key(key: &str) -> bool {
    key.contains(REPOSITORIES_SEGMENT) && key.ends_with(LINK_SUFFIX)
}

/// Extracts the digest from a blob data key: the segment right before `data`.
///
/// Algorithm and shard segments are not validated. An empty digest segment
/// (`.../ab//data`) is rejected.
pub fn digest_from_blob_key(key: &str) -> Result<Digest> {
    if !key.ends_with(BLOB_DATA_SUFFIX) {
        return Err(RegScanError::InvalidKey(format!(
            "blob key does not end with {}: {}",
            BLOB_DATA_SUFFIX, key
        )));
    }

    let segments: Vec<&str> = key.split('/').collect();
    // ends_with("/data") guarantees at least two segments
    let digest = segments[segments.len() - 2];
    if digest.is_empty() {
        return Err(RegScanError::InvalidKey(format!(
            "blob key has an empty digest segment: {}",
            key
        )));
    }
    Ok(Digest::new(digest))
}

/// Reads the digest a link body points at.
///
/// `sha256:<hex>` yields `<hex>`. Bodies without a known algorithm prefix are
/// returned unchanged. No whitespace trimming.
pub fn digest_from_link_body(body: &str) -> Digest {
    for algorithm in DIGEST_ALGORITHMS {
        if let Some(rest) = body
            .strip_prefix(algorithm)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return Digest::new(rest);
        }
    }

    Digest::new(body)
}

/// Builds the data key of a blob, sharded by the first two digest characters.
pub fn blob_data_key(layout: &RegistryLayout, algorithm: &str, digest: &str) -> String {
    let shard = digest.get(..2).unwrap_or(digest);
    format!(
        "{}/{}/{}/{}{}",
        layout.blobs_prefix(),
        algorithm,
        shard,
        digest,
        BLOB_DATA_SUFFIX
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "0002845795df2438ed1c832452431f106e633eff7fff00bddd65863c60bcba75";

    #[test]
    fn test_blob_key_classification() {
        let key = format!("docker/registry/v2/blobs/sha256/00/{}/data", DIGEST);
        assert!(is_blob_key(&key));
        assert!(!is_link_key(&key));

        assert!(!is_blob_key("docker/registry/v2/blobs/sha256/00/abc"));
        assert!(!is_blob_key("docker/registry/v2/uploads/abc/data"));
    }

    #[test]
    fn test_link_key_classification() {
        let layer = "docker/registry/v2/repositories/library/ubuntu/_layers/sha256/abc/link";
        let tag = "docker/registry/v2/repositories/library/ubuntu/_manifests/tags/latest/current/link";
        assert!(is_link_key(layer));
        assert!(is_link_key(tag));
        assert!(!is_blob_key(layer));

        assert!(!is_link_key(
            "docker/registry/v2/repositories/library/ubuntu/_uploads/abc/startedat"
        ));
        assert!(!is_link_key("docker/registry/v2/blobs/sha256/ab/abc/link"));
    }

    #[test]
    fn test_digest_from_blob_key() {
        let key = format!("docker/registry/v2/blobs/sha256/00/{}/data", DIGEST);
        assert_eq!(digest_from_blob_key(&key).unwrap().as_str(), DIGEST);

        // shard and algorithm are not checked
        let odd = "blobs/whatever/zz/deadbeef/data";
        assert_eq!(digest_from_blob_key(odd).unwrap().as_str(), "deadbeef");
    }

    #[test]
    fn test_digest_from_blob_key_rejects_missing_suffix() {
        let result = digest_from_blob_key("docker/registry/v2/blobs/sha256/00/abc");
        assert!(matches!(result, Err(RegScanError::InvalidKey(_))));

        let result = digest_from_blob_key("docker/registry/v2/blobs/sha256/00/abc/database");
        assert!(matches!(result, Err(RegScanError::InvalidKey(_))));
    }

    #[test]
    fn test_digest_from_blob_key_rejects_empty_segment() {
        let key = "docker/registry/v2/blobs/sha256/ab//data";
        assert!(is_blob_key(key));
        assert!(matches!(
            digest_from_blob_key(key),
            Err(RegScanError::InvalidKey(_))
        ));
        assert!(digest_from_blob_key("/data").is_err());
    }

    #[test]
    fn test_blob_data_key_round_trip() {
        let layout = RegistryLayout::default();
        let key = blob_data_key(&layout, "sha256", DIGEST);
        assert_eq!(
            key,
            format!("docker/registry/v2/blobs/sha256/00/{}/data", DIGEST)
        );
        assert!(is_blob_key(&key));
        assert_eq!(digest_from_blob_key(&key).unwrap().as_str(), DIGEST);
    }

    #[test]
    fn test_digest_from_link_body() {
        assert_eq!(digest_from_link_body("sha256:abc123").as_str(), "abc123");
        assert_eq!(digest_from_link_body("sha512:abc123").as_str(), "abc123");
        assert_eq!(digest_from_link_body("abc123").as_str(), "abc123");
        assert_eq!(digest_from_link_body("md5:abc123").as_str(), "md5:abc123");
        assert_eq!(digest_from_link_body("sha256abc").as_str(), "sha256abc");
        assert_eq!(digest_from_link_body("sha256:abc\n").as_str(), "abc\n");
        assert_eq!(digest_from_link_body("").as_str(), "");
    }

    #[test]
    fn test_layout_prefixes() {
        let layout = RegistryLayout::default();
        assert_eq!(layout.blobs_prefix(), "docker/registry/v2/blobs");
        assert_eq!(layout.repositories_prefix(), "docker/registry/v2/repositories");

        let custom = RegistryLayout::new("/mirror/docker/registry/v2/");
        assert_eq!(custom.root(), "mirror/docker/registry/v2");
        assert_eq!(custom.blobs_prefix(), "mirror/docker/registry/v2/blobs");

        let bare = RegistryLayout::new("");
        assert_eq!(bare.repositories_prefix(), "repositories");
    }
}
