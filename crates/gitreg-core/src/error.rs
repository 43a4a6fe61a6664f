//! Error types for registry operations

use thiserror::Error;

/// Registry operation errors
#[derive(Debug, Error)]
pub enum RegistryError {
    // ============ Remote Errors ============
    #[error("Remote unavailable: {remote} - {message}")]
    RemoteUnavailable { remote: String, message: String },

    // ============ Manifest Errors ============
    #[error("Invalid manifest at {entry} in {git_ref}: {message}")]
    ManifestParse {
        git_ref: String,
        entry: String,
        message: String,
    },

    // ============ Configuration Errors ============
    #[error("Invalid repository configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid ref filter pattern '{pattern}': {message}")]
    InvalidRefFilter { pattern: String, message: String },

    // ============ Request Errors ============
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Other ============
    #[error("{0}")]
    Other(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    /// Build a `NotFound` for a package or version
    pub fn not_found(what: impl Into<String>) -> Self {
        RegistryError::NotFound { what: what.into() }
    }

    /// True when the error should map to a client-facing 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

impl From<regex::Error> for RegistryError {
    fn from(e: regex::Error) -> Self {
        RegistryError::Other(format!("invalid pattern: {}", e))
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(e: tokio::task::JoinError) -> Self {
        RegistryError::Other(format!("background task failed: {}", e))
    }
}
