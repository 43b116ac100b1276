//! s3backup-core: Core library for the s3backup tool
//!
//! This crate provides the backup logic itself:
//! - Settings loading and default generation
//! - The ObjectStore and Connector traits the S3 adapter implements
//! - The ensure-bucket protocol with bounded retries
//! - Timestamped upload manifests and the per-file upload pipeline
//! - `BackupPlan`, which ties setup and upload together
//!
//! Nothing here depends on a specific S3 SDK, so every step can be tested
//! against mocks.

pub mod ensure;
pub mod error;
pub mod plan;
pub mod retry;
pub mod settings;
pub mod traits;
pub mod upload;

pub use ensure::ensure_bucket;
pub use error::{Error, Result};
pub use plan::BackupPlan;
pub use retry::{RetryBuilder, RetryConfig};
pub use settings::{Auth, DEFAULT_SETTINGS_FILE, Settings, SettingsFormat, SettingsManager};
pub use traits::{
    BINARY_CONTENT_TYPE, BucketRef, CannedAcl, Connector, ListOptions, ListResult, ObjectStore,
    SourceFile,
};
pub use upload::{
    FOLDER_LAYOUT, FailureCause, FileFailure, Manifest, ManifestEntry, UploadErrors, UploadReport,
    UploadStep, UploadedObject,
};
