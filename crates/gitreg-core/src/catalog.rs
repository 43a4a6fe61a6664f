//! Package catalog
//!
//! Discovers every `(ref, path, manifest)` tuple across the refs that
//! pass the remote's ref filter, then memoizes the result for the
//! lifetime of the process. Population is single-flight: concurrent
//! first requesters share one load, and the catalog is only retried
//! while it has never been populated.

use tokio::sync::OnceCell;

use crate::config::RemoteConfig;
use crate::error::Result;
use crate::git;
use crate::manifest::Manifest;

/// One discovered manifest at one ref/subtree
///
/// Immutable once created; the manifest is preserved verbatim.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    /// Fully qualified ref the manifest was found at
    pub git_ref: String,
    /// Directory containing the manifest, relative to the tree root
    pub path: String,
    /// The manifest itself
    pub manifest: Manifest,
}

impl PackageEntry {
    fn is(&self, name: &str, version: &str) -> bool {
        self.manifest.name() == Some(name) && self.manifest.version() == Some(version)
    }
}

/// Memoized set of package entries for one remote
pub struct PackageCatalog {
    remote: RemoteConfig,
    entries: OnceCell<Vec<PackageEntry>>,
}

impl PackageCatalog {
    /// Create an unpopulated catalog for a remote
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            remote,
            entries: OnceCell::new(),
        }
    }

    /// Create a catalog with a known entry set (warm start, tests)
    pub fn preloaded(remote: RemoteConfig, entries: Vec<PackageEntry>) -> Self {
        Self {
            remote,
            entries: OnceCell::new_with(Some(entries)),
        }
    }

    /// The remote this catalog serves
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    /// All discovered entries, populating the catalog on first demand
    ///
    /// Duplicate (name, version) pairs across refs are kept; lookup
    /// helpers return the first match in discovery order.
    pub async fn entries(&self) -> Result<&[PackageEntry]> {
        self.entries
            .get_or_try_init(|| self.load())
            .await
            .map(Vec::as_slice)
    }

    async fn load(&self) -> Result<Vec<PackageEntry>> {
        let filter = self.remote.resolve_ref_filter().await?;
        let refs = git::list_refs(&self.remote.url).await?;

        let mut entries = Vec::new();
        for ref_entry in refs {
            if !filter.matches(&ref_entry.name) {
                continue;
            }
            let manifests = git::archive_manifests(
                &self.remote.url,
                &ref_entry.name,
                &self.remote.manifest_glob,
            )
            .await?;
            for (path, manifest) in manifests {
                entries.push(PackageEntry {
                    git_ref: ref_entry.name.clone(),
                    path,
                    manifest,
                });
            }
        }
        tracing::info!(
            remote = %self.remote.name,
            count = entries.len(),
            "package catalog populated"
        );
        Ok(entries)
    }

    /// Distinct package names, each represented by the entry with the
    /// lexicographically greatest version string
    ///
    /// Names appear in discovery order; version ties keep the earlier
    /// entry. Ordering is plain string comparison, not semver.
    pub async fn latest_versions(&self) -> Result<Vec<&PackageEntry>> {
        let entries = self.entries().await?;
        let mut by_name: Vec<(&str, &PackageEntry)> = Vec::new();
        for entry in entries {
            let Some(name) = entry.manifest.name() else {
                continue;
            };
            match by_name.iter_mut().find(|(seen, _)| *seen == name) {
                Some((_, best)) => {
                    if entry.manifest.version() > best.manifest.version() {
                        *best = entry;
                    }
                }
                None => by_name.push((name, entry)),
            }
        }
        Ok(by_name.into_iter().map(|(_, entry)| entry).collect())
    }

    /// All entries for a package name, sorted by version string
    /// descending (stable, so equal versions keep discovery order)
    pub async fn versions_of(&self, name: &str) -> Result<Vec<&PackageEntry>> {
        let entries = self.entries().await?;
        let mut versions: Vec<&PackageEntry> = entries
            .iter()
            .filter(|entry| entry.manifest.name() == Some(name))
            .collect();
        versions.sort_by(|a, b| b.manifest.version().cmp(&a.manifest.version()));
        Ok(versions)
    }

    /// First entry matching (name, version) in discovery order
    pub async fn find(&self, name: &str, version: &str) -> Result<Option<&PackageEntry>> {
        let entries = self.entries().await?;
        Ok(entries.iter().find(|entry| entry.is(name, version)))
    }
}
