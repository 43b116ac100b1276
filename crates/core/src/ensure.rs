//! Ensure the destination bucket exists
//!
//! The bucket is checked with a one-key listing. A missing bucket is
//! created and checked again, up to `RetryConfig::max_attempts` checks.
//! Any other listing failure ends the protocol at once.

use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::traits::{BucketRef, CannedAcl, ListOptions, ObjectStore};

/// Make sure `name` exists on `store`, creating it if needed
pub async fn ensure_bucket(
    store: &dyn ObjectStore,
    name: &str,
    retry: &RetryConfig,
) -> Result<BucketRef> {
    let bucket = store.resolve_bucket(name)?;
    let mut last_error = None;

    for attempt in 1..=retry.max_attempts {
        match bucket_exists(store, &bucket).await {
            Ok(true) => {
                tracing::debug!(bucket = %bucket, attempt, "Bucket exists");
                return Ok(bucket);
            }
            Ok(false) => {}
            // A failed create explains a failing re-check better than the check does.
            Err(e) => return Err(last_error.unwrap_or(e)),
        }

        // A create after the last check could never be confirmed.
        if attempt == retry.max_attempts {
            break;
        }

        tracing::info!(bucket = %bucket, attempt, "Bucket not found, creating");
        match store
            .create_bucket(&bucket, CannedAcl::BucketOwnerFullControl)
            .await
        {
            Ok(()) => last_error = None,
            Err(e) => {
                // Someone else may have created it; the next check decides.
                tracing::warn!(bucket = %bucket, error = %e, "Failed to create bucket");
                last_error = Some(e);
            }
        }

        tokio::time::sleep(retry.backoff(attempt)).await;
    }

    Err(last_error.unwrap_or_else(|| {
        Error::NotFound(format!(
            "bucket '{bucket}' could not be confirmed after {} attempts",
            retry.max_attempts
        ))
    }))
}

/// `Ok(false)` only when the store says the bucket is missing
async fn bucket_exists(store: &dyn ObjectStore, bucket: &BucketRef) -> Result<bool> {
    let options = ListOptions {
        max_keys: Some(1),
        ..Default::default()
    };

    match store.list_objects(bucket, options).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
