//! Server configuration
//!
//! The server reads an optional YAML file naming the listen address
//! and the remotes to mount; CLI flags override and extend it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use gitreg_core::config::RemoteConfig;
use gitreg_core::error::{RegistryError, Result};

/// Default listen address when neither file nor flag names one
pub const DEFAULT_LISTEN: &str = "127.0.0.1:1234";

/// Server configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address, `host:port`
    #[serde(default)]
    pub listen: Option<String>,

    /// Remotes to mount
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| RegistryError::ConfigParse {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// The effective listen address
    pub fn listen(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }
}

/// Parse a `NAME=URL` remote flag
pub fn parse_remote_arg(arg: &str) -> Result<RemoteConfig> {
    match arg.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => {
            Ok(RemoteConfig::new(name, url))
        }
        _ => Err(RegistryError::ConfigParse {
            message: format!("expected NAME=URL, got '{}'", arg),
        }),
    }
}
