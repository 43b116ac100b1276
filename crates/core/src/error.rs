//! Error types for s3backup-core
//!
//! Store adapters translate their SDK failures into these variants so the
//! backup logic can tell a missing bucket apart from everything else.

use thiserror::Error;

use crate::upload::UploadErrors;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading settings, talking to the store, or uploading
#[derive(Error, Debug)]
pub enum Error {
    /// Settings file missing, unreadable, or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bucket name rejected before any request was sent
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    /// The bucket (or object) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials were rejected or lack permission
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The resource exists but belongs to someone else
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other failure reported by the store or its transport
    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// One or more files of an upload pass failed
    #[error("{0}")]
    Upload(#[from] UploadErrors),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether the store reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the store refused the credentials
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_))
    }
}
