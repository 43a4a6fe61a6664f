//! Remote configuration and the ref-filter override
//!
//! Each served remote is one git URL plus a ref filter deciding which
//! refs count as package sources. The filter comes from static
//! configuration, or from a `.upm-git.json` file committed at the
//! remote's HEAD, shaped `{ "refFilter": "<regex>" }`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::git;

/// Override file looked up at the remote's HEAD
pub const REPO_CONFIG_FILE: &str = ".upm-git.json";

/// Ref filter applied when no override and no static pattern is set
pub const DEFAULT_REF_FILTER: &str = "^refs/tags/";

/// Glob handed to `git archive` when discovering manifests
pub const DEFAULT_MANIFEST_GLOB: &str = "*/package.json";

/// A served git remote
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Mount name, the leading path segment of every registry route
    pub name: String,

    /// Resolvable git remote (URL or local path)
    pub url: String,

    /// Static ref filter pattern; `.upm-git.json` at HEAD takes
    /// precedence when present
    #[serde(default)]
    pub ref_filter: Option<String>,

    /// Pathspec used to discover package manifests
    #[serde(default = "default_manifest_glob")]
    pub manifest_glob: String,
}

fn default_manifest_glob() -> String {
    DEFAULT_MANIFEST_GLOB.to_string()
}

impl RemoteConfig {
    /// Create a remote with default filter and manifest glob
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ref_filter: None,
            manifest_glob: default_manifest_glob(),
        }
    }

    /// Resolve the effective ref filter for this remote
    ///
    /// Order: `.upm-git.json` at HEAD, then the static pattern, then
    /// the built-in default. A present-but-malformed override is a
    /// hard error, never silently ignored.
    pub async fn resolve_ref_filter(&self) -> Result<RefFilter> {
        if let Some(filter) = load_ref_filter(&self.url).await? {
            tracing::info!(remote = %self.name, pattern = filter.pattern(), "using ref filter from repository");
            return Ok(filter);
        }
        match &self.ref_filter {
            Some(pattern) => RefFilter::new(pattern),
            None => RefFilter::new(DEFAULT_REF_FILTER),
        }
    }
}

/// Compiled ref-inclusion pattern
#[derive(Debug, Clone)]
pub struct RefFilter {
    pattern: String,
    regex: Regex,
}

impl RefFilter {
    /// Compile a filter from a regex pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| RegistryError::InvalidRefFilter {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The source pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Does a fully qualified ref name pass the filter?
    pub fn matches(&self, ref_name: &str) -> bool {
        self.regex.is_match(ref_name)
    }
}

/// On-disk shape of `.upm-git.json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoOverride {
    ref_filter: String,
}

/// Fetch the ref-filter override from the remote's HEAD
///
/// Absence of the file is `Ok(None)`; a file that is present but
/// malformed (bad JSON, missing `refFilter`, invalid pattern) is an
/// operator error and fails hard.
pub async fn load_ref_filter(remote: &str) -> Result<Option<RefFilter>> {
    let Some(bytes) = git::archive_file(remote, "HEAD", REPO_CONFIG_FILE).await? else {
        return Ok(None);
    };
    let parsed: RepoOverride =
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::ConfigParse {
            message: format!("{}: {}", REPO_CONFIG_FILE, e),
        })?;
    RefFilter::new(&parsed.ref_filter).map(Some)
}
