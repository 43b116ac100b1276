//! Object store traits
//!
//! `ObjectStore` is the only surface the backup logic needs from a remote
//! store. `Connector` builds one from settings, which keeps client
//! construction swappable in tests.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::settings::Settings;

/// Content type used for every backed-up object
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// A bucket name the store has accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    name: String,
}

impl BucketRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Canned access policies used by the backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    /// Bucket owner gets full control (bucket creation)
    BucketOwnerFullControl,
    /// Bucket owner may read (uploaded objects)
    BucketOwnerRead,
}

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
        }
    }
}

/// Options for listing objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix
    pub prefix: Option<String>,

    /// Group keys sharing a prefix up to this delimiter
    pub delimiter: Option<String>,

    /// Start listing after this key
    pub marker: Option<String>,

    /// Maximum number of keys to return
    pub max_keys: Option<i32>,
}

/// Result of a list operation
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
}

/// An opened local file ready to be streamed
#[derive(Debug)]
pub struct SourceFile {
    pub file: tokio::fs::File,
    pub length: u64,
}

/// Operations the backup performs against a remote store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Turn a bucket name into a handle, rejecting names the store
    /// cannot accept
    fn resolve_bucket(&self, name: &str) -> Result<BucketRef>;

    /// List objects. A missing bucket is reported as `Error::NotFound`.
    async fn list_objects(&self, bucket: &BucketRef, options: ListOptions) -> Result<ListResult>;

    /// Create the bucket
    async fn create_bucket(&self, bucket: &BucketRef, acl: CannedAcl) -> Result<()>;

    /// Stream a local file into `key`
    async fn put_object(
        &self,
        bucket: &BucketRef,
        key: &str,
        source: SourceFile,
        content_type: &str,
        acl: CannedAcl,
    ) -> Result<()>;
}

/// Builds an `ObjectStore` from settings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &Settings) -> Result<Box<dyn ObjectStore>>;
}
