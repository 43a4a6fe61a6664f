//! Content-hash cache
//!
//! Memoizes the SHA-1 of each version's tgz archive, keyed by
//! (ref, path). Archived bytes for a fixed key never change, so
//! entries are never evicted. Misses are single-flight: concurrent
//! requests for the same uncached key share one archive/hash pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::git;

/// Archive format the registry hashes and serves for `dist`
pub const DIST_FORMAT: &str = "tgz";

/// A version's distribution block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistInfo {
    /// Download URL, `/{remote}/{name}/{version}/download.tgz`
    pub tarball: String,
    /// Lowercase hex SHA-1 of the tgz archive
    pub shasum: String,
}

type HashKey = (String, String);

/// Process-wide SHA-1 cache for one remote
pub struct DistCache {
    mount: String,
    remote_url: String,
    hashes: Mutex<HashMap<HashKey, Arc<OnceCell<String>>>>,
}

impl DistCache {
    /// Create an empty cache for a remote mounted at `mount`
    pub fn new(mount: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            remote_url: remote_url.into(),
            hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Distribution info for one package version living at (ref, path)
    pub async fn dist_info(
        &self,
        git_ref: &str,
        path: &str,
        name: &str,
        version: &str,
    ) -> Result<DistInfo> {
        Ok(DistInfo {
            tarball: format!(
                "/{}/{}/{}/download.{}",
                self.mount, name, version, DIST_FORMAT
            ),
            shasum: self.shasum(git_ref, path).await?,
        })
    }

    /// SHA-1 of the tgz archive of `path` at `git_ref`, computed once
    /// per key
    pub async fn shasum(&self, git_ref: &str, path: &str) -> Result<String> {
        let cell = self.slot(git_ref, path);
        let shasum = cell
            .get_or_try_init(|| hash_archive(&self.remote_url, git_ref, path))
            .await?;
        Ok(shasum.clone())
    }

    /// Pre-populate a hash (warm start, tests)
    pub fn insert(&self, git_ref: &str, path: &str, shasum: impl Into<String>) {
        let cell = self.slot(git_ref, path);
        let _ = cell.set(shasum.into());
    }

    /// The in-flight-computation slot for a key
    fn slot(&self, git_ref: &str, path: &str) -> Arc<OnceCell<String>> {
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes
            .entry((git_ref.to_string(), path.to_string()))
            .or_default()
            .clone()
    }
}

/// Stream a tgz archive through SHA-1 without buffering it
async fn hash_archive(remote_url: &str, git_ref: &str, path: &str) -> Result<String> {
    let mut stream = git::archive_content(remote_url, git_ref, path, DIST_FORMAT)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    stream.finish().await?;
    let shasum = hex::encode(hasher.finalize());
    tracing::debug!(git_ref, path, shasum, "hashed content archive");
    Ok(shasum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cached_hash_skips_archive_work() {
        // The remote does not exist; a cache miss would fail loudly.
        let cache = DistCache::new("r", "/tmp/does-not-exist.git");
        cache.insert("refs/tags/v1.0.0", "pkg-a", "da39a3ee5e6b4b0d3255bfef95601890afd80709");

        let dist = cache
            .dist_info("refs/tags/v1.0.0", "pkg-a", "pkg-a", "1.0.0")
            .await
            .unwrap();
        assert_eq!(dist.tarball, "/r/pkg-a/1.0.0/download.tgz");
        assert_eq!(dist.shasum, "da39a3ee5e6b4b0d3255bfef95601890afd80709");

        // repeated calls return the same value
        let again = cache
            .dist_info("refs/tags/v1.0.0", "pkg-a", "pkg-a", "1.0.0")
            .await
            .unwrap();
        assert_eq!(dist, again);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = DistCache::new("r", "/tmp/does-not-exist.git");
        cache.insert("refs/tags/v1.0.0", "pkg-a", "aaaa");
        cache.insert("refs/tags/v2.0.0", "pkg-a", "bbbb");

        assert_eq!(cache.shasum("refs/tags/v1.0.0", "pkg-a").await.unwrap(), "aaaa");
        assert_eq!(cache.shasum("refs/tags/v2.0.0", "pkg-a").await.unwrap(), "bbbb");
    }

    #[tokio::test]
    async fn test_miss_on_unreachable_remote_is_error() {
        let cache = DistCache::new("r", "/tmp/does-not-exist.git");
        assert!(cache.shasum("refs/tags/v1.0.0", "pkg-a").await.is_err());
    }
}
