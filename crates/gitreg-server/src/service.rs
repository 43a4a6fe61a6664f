//! Registry service and response builders
//!
//! One `RegistryService` is constructed at startup and shared by
//! reference across request handlers. It owns a `RemoteRegistry`
//! (package catalog + dist cache) per configured mount and assembles
//! the registry-shaped JSON documents: the abbreviated catalog, the
//! packument, the version document, search results, and the streaming
//! download.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Map, Value};

use gitreg_core::catalog::{PackageCatalog, PackageEntry};
use gitreg_core::config::RemoteConfig;
use gitreg_core::dist::DistCache;
use gitreg_core::error::{RegistryError, Result};
use gitreg_core::git::{self, ArchiveStream};
use gitreg_core::manifest::Manifest;

/// Archive formats `git archive` can produce
const DOWNLOAD_FORMATS: &[&str] = &["tar", "tar.gz", "tgz", "zip"];

/// Catalog and hash cache for one mounted remote
pub struct RemoteRegistry {
    catalog: PackageCatalog,
    dist: DistCache,
}

impl RemoteRegistry {
    /// Create the per-remote state for a configured remote
    pub fn new(config: RemoteConfig) -> Self {
        let dist = DistCache::new(&config.name, &config.url);
        Self {
            catalog: PackageCatalog::new(config),
            dist,
        }
    }

    /// Create with a known catalog (warm start, tests)
    pub fn preloaded(config: RemoteConfig, entries: Vec<PackageEntry>) -> Self {
        let dist = DistCache::new(&config.name, &config.url);
        Self {
            catalog: PackageCatalog::preloaded(config, entries),
            dist,
        }
    }

    /// The remote's dist cache
    pub fn dist(&self) -> &DistCache {
        &self.dist
    }

    fn config(&self) -> &RemoteConfig {
        self.catalog.remote()
    }
}

/// The registry: every mounted remote, addressed by mount name
pub struct RegistryService {
    remotes: HashMap<String, RemoteRegistry>,
}

impl RegistryService {
    /// Build the service from per-remote registries
    pub fn new(registries: impl IntoIterator<Item = RemoteRegistry>) -> Self {
        let remotes = registries
            .into_iter()
            .map(|registry| (registry.config().name.clone(), registry))
            .collect();
        Self { remotes }
    }

    /// Build the service from remote configurations
    pub fn from_configs(configs: impl IntoIterator<Item = RemoteConfig>) -> Self {
        Self::new(configs.into_iter().map(RemoteRegistry::new))
    }

    /// Mount names in no particular order
    pub fn mounts(&self) -> Vec<&str> {
        self.remotes.keys().map(String::as_str).collect()
    }

    fn remote(&self, mount: &str) -> Result<&RemoteRegistry> {
        self.remotes
            .get(mount)
            .ok_or_else(|| RegistryError::not_found(format!("remote '{}'", mount)))
    }

    /// `GET /{remote}` - 200 with empty body when the mount exists
    pub async fn liveness(&self, mount: &str) -> Result<()> {
        self.remote(mount).map(|_| ())
    }

    /// `GET /{remote}/-/all` - abbreviated catalog
    ///
    /// One entry per distinct name, built from the newest version's
    /// manifest, plus the `_updated` sentinel.
    pub async fn all_packages(&self, mount: &str) -> Result<Value> {
        let registry = self.remote(mount)?;
        let latest = registry.catalog.latest_versions().await?;

        let mut doc = Map::new();
        doc.insert("_updated".to_string(), json!(99999));
        for entry in latest {
            let manifest = &entry.manifest;
            let (Some(name), Some(version)) = (manifest.name(), manifest.version()) else {
                continue;
            };
            let mut versions = Map::new();
            versions.insert(version.to_string(), json!("latest"));
            doc.insert(
                name.to_string(),
                json!({
                    "name": name,
                    "description": manifest.description(),
                    "maintainers": manifest.maintainers(),
                    "versions": versions,
                    "time": Value::Null,
                    "keywords": manifest.keywords(),
                    "author": manifest.author(),
                }),
            );
        }
        Ok(Value::Object(doc))
    }

    /// `GET /{remote}/{package}` - the full multi-version packument
    pub async fn packument(&self, mount: &str, package: &str) -> Result<Value> {
        let registry = self.remote(mount)?;
        let version_list = registry.catalog.versions_of(package).await?;
        let Some(latest) = version_list.first() else {
            return Err(RegistryError::not_found(format!("package '{}'", package)));
        };

        let now = json!(Utc::now());
        let mut versions = Map::new();
        let mut times = Map::new();
        times.insert("modified".to_string(), now.clone());
        times.insert("created".to_string(), now.clone());
        for entry in &version_list {
            let manifest = &entry.manifest;
            let Some(version) = manifest.version() else {
                continue;
            };
            let dist = registry
                .dist
                .dist_info(&entry.git_ref, &entry.path, package, version)
                .await?;
            versions.insert(
                version.to_string(),
                json!({
                    "name": manifest.name(),
                    "description": manifest.description(),
                    "version": version,
                    "dist": dist,
                    "dependencies": manifest.dependencies(),
                    "_id": format!("{}@{}", package, version),
                    "gitHead": entry.git_ref,
                    "unity": manifest.unity(),
                    "displayName": manifest.display_name(),
                    "repoPackagePath": entry.path,
                }),
            );
            times.insert(version.to_string(), now.clone());
        }

        Ok(json!({
            "_id": package,
            "_rev": "1-0",
            "name": package,
            "description": latest.manifest.description(),
            "dist-tags": {
                "latest": latest.manifest.version(),
            },
            "versions": versions,
            "repository": {
                "revision": latest.git_ref,
                "type": "git",
                "url": registry.config().url,
            },
            "time": times,
        }))
    }

    /// `GET /{remote}/{package}/{version}` - single version document
    ///
    /// The raw manifest, preserved verbatim, merged with `repository`,
    /// `dist` and `_id`.
    pub async fn version_doc(&self, mount: &str, package: &str, version: &str) -> Result<Value> {
        let registry = self.remote(mount)?;
        let Some(entry) = registry.catalog.find(package, version).await? else {
            return Err(RegistryError::not_found(format!(
                "package '{}@{}'",
                package, version
            )));
        };
        let dist = registry
            .dist
            .dist_info(&entry.git_ref, &entry.path, package, version)
            .await?;

        let mut doc = entry.manifest.fields().clone();
        doc.insert(
            "repository".to_string(),
            json!({
                "revision": entry.git_ref,
                "type": "git",
                "url": registry.config().url,
            }),
        );
        doc.insert("dist".to_string(), json!(dist));
        doc.insert("_id".to_string(), json!(format!("{}@{}", package, version)));
        Ok(Value::Object(doc))
    }

    /// `GET /{remote}/-/v1/search` - linear substring search
    ///
    /// `text` filters (case-sensitive) over name, displayName,
    /// description and keywords; `size` truncates the result list and
    /// must be numeric when present.
    pub async fn search(
        &self,
        mount: &str,
        text: Option<&str>,
        size: Option<&str>,
    ) -> Result<Value> {
        let registry = self.remote(mount)?;
        let entries = registry.catalog.entries().await?;

        let mut manifests: Vec<&Manifest> = entries.iter().map(|entry| &entry.manifest).collect();
        if let Some(text) = text {
            manifests.retain(|manifest| {
                field_contains(manifest, "name", text)
                    || field_contains(manifest, "displayName", text)
                    || field_contains(manifest, "description", text)
                    || field_contains(manifest, "keywords", text)
            });
        }
        if let Some(size) = size {
            let limit: usize = size.parse().map_err(|_| RegistryError::BadRequest {
                message: format!("size must be numeric, got '{}'", size),
            })?;
            manifests.truncate(limit);
        }

        let objects: Vec<Value> = manifests
            .iter()
            .map(|manifest| {
                json!({
                    "package": {
                        "name": manifest.name(),
                        "description": manifest.description(),
                        "maintainers": manifest.maintainers(),
                        "version": manifest.version(),
                        "date": manifest.get("date").cloned().unwrap_or(Value::Null),
                        "keywords": manifest.keywords(),
                        "author": manifest.author(),
                    }
                })
            })
            .collect();
        Ok(json!({ "objects": objects }))
    }

    /// `GET /{remote}/{package}/{version}/download.{format}` - archive
    /// stream plus its content type
    pub async fn download(
        &self,
        mount: &str,
        package: &str,
        version: &str,
        format: &str,
    ) -> Result<(String, ArchiveStream)> {
        // reject before spawning: a format git cannot produce would
        // otherwise stream an empty 200 body
        if !DOWNLOAD_FORMATS.contains(&format) {
            return Err(RegistryError::BadRequest {
                message: format!("unsupported archive format '{}'", format),
            });
        }
        let registry = self.remote(mount)?;
        let Some(entry) = registry.catalog.find(package, version).await? else {
            return Err(RegistryError::not_found(format!(
                "package '{}@{}'",
                package, version
            )));
        };
        let stream = git::archive_content(
            &registry.config().url,
            &entry.git_ref,
            &entry.path,
            format,
        )?;
        Ok((format!("application/{}", format), stream))
    }
}

/// Case-sensitive substring match against a manifest field
///
/// Strings are matched directly; any other value (keyword arrays in
/// particular) is matched against its JSON text.
fn field_contains(manifest: &Manifest, field: &str, needle: &str) -> bool {
    match manifest.get(field) {
        Some(Value::String(s)) => s.contains(needle),
        Some(other) => other.to_string().contains(needle),
        None => false,
    }
}
