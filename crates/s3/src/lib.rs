//! s3backup-s3: S3 SDK adapter for s3backup
//!
//! This crate implements the `ObjectStore` and `Connector` traits from
//! s3backup-core on top of aws-sdk-s3.

mod client;

pub use client::{S3Client, S3Connector, validate_bucket_name};
