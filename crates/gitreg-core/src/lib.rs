//! gitreg core
//!
//! Translates three git primitives into the npm registry document
//! model:
//!
//! - **ref listing** (`git ls-remote`) discovers which refs are
//!   package sources
//! - **tree archiving** (`git archive --format=tar`) extracts package
//!   manifests across refs
//! - **content streaming** (`git archive --format=tgz`) serves and
//!   hashes version tarballs
//!
//! The crate owns the translation and caching layer: the package
//! catalog (load-once, single-flight), the SHA-1 dist cache, the
//! ref-filter configuration, and the opaque ordered manifest model.
//! HTTP routing and response assembly live in `gitreg-server`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gitreg_core::{DistCache, PackageCatalog, RemoteConfig};
//!
//! # async fn example() -> gitreg_core::Result<()> {
//! let remote = RemoteConfig::new("r", "https://example.com/packages.git");
//! let catalog = PackageCatalog::new(remote.clone());
//! let dist = DistCache::new(&remote.name, &remote.url);
//!
//! for entry in catalog.latest_versions().await? {
//!     let info = dist
//!         .dist_info(
//!             &entry.git_ref,
//!             &entry.path,
//!             entry.manifest.name().unwrap_or_default(),
//!             entry.manifest.version().unwrap_or_default(),
//!         )
//!         .await?;
//!     println!("{} -> {}", info.tarball, info.shasum);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod dist;
pub mod error;
pub mod git;
pub mod manifest;

// Re-exports for convenience
pub use catalog::{PackageCatalog, PackageEntry};
pub use config::{RefFilter, RemoteConfig, DEFAULT_MANIFEST_GLOB, DEFAULT_REF_FILTER};
pub use dist::{DistCache, DistInfo, DIST_FORMAT};
pub use error::{RegistryError, Result};
pub use git::{ArchiveStream, RefEntry};
pub use manifest::Manifest;
