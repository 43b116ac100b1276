//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from s3backup-core.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::byte_stream::Length;
use s3backup_core::{
    BucketRef, CannedAcl, Connector, Error, ListOptions, ListResult, ObjectStore, Result,
    Settings, SourceFile,
};

/// Region that must not be sent as a location constraint
const US_EAST_1: &str = "us-east-1";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    region: String,
}

impl S3Client {
    /// Create a new S3 client from backup settings
    pub async fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let region = settings.region_or_default().to_string();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        // Static credentials from the settings file win over the default chain
        if settings.auth.has_keys() {
            let credentials = aws_credential_types::Credentials::new(
                &settings.auth.access_key,
                &settings.auth.secret_key,
                settings.auth.session_token.clone(),
                None, // expiry
                "s3backup-settings",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        // Custom endpoints are usually S3-compatible servers that expect path-style
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        tracing::debug!(
            region = %region,
            endpoint = settings.endpoint.as_deref().unwrap_or("aws"),
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            region,
        })
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E, HttpResponse>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {})", code_str));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }

    /// Translate an SDK failure into the core error taxonomy
    fn map_sdk_error<E>(error: &SdkError<E, HttpResponse>, what: &str) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let code = error.as_service_error().and_then(|e| e.code());
        let status = error.raw_response().map(|r| r.status().as_u16());
        classify(code, status, format!("{what}: {}", Self::format_sdk_error(error)))
    }
}

/// Pick an error variant from an S3 error code, falling back to the HTTP status
fn classify(code: Option<&str>, status: Option<u16>, message: String) -> Error {
    match code {
        Some("NoSuchBucket" | "NotFound") => Error::NotFound(message),
        Some(
            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "Forbidden"
            | "ExpiredToken" | "InvalidToken",
        ) => Error::AccessDenied(message),
        Some("BucketAlreadyExists") => Error::Conflict(message),
        Some(_) => Error::Network(message),
        None => match status {
            Some(404) => Error::NotFound(message),
            Some(401 | 403) => Error::AccessDenied(message),
            _ => Error::Network(message),
        },
    }
}

/// CreateBucket has no bucket-owner policies; `private` gives the owner full control
fn bucket_acl(acl: CannedAcl) -> BucketCannedAcl {
    match acl {
        CannedAcl::BucketOwnerFullControl | CannedAcl::BucketOwnerRead => BucketCannedAcl::Private,
    }
}

fn object_acl(acl: CannedAcl) -> ObjectCannedAcl {
    match acl {
        CannedAcl::BucketOwnerFullControl => ObjectCannedAcl::BucketOwnerFullControl,
        CannedAcl::BucketOwnerRead => ObjectCannedAcl::BucketOwnerRead,
    }
}

/// Check S3 bucket naming rules
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidBucket(format!("'{name}': {reason}")));

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be between 3 and 63 characters long");
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return invalid("must start and end with a letter or digit");
    }

    if name.contains("..") {
        return invalid("must not contain consecutive periods");
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return invalid("must not be formatted as an IP address");
    }

    Ok(())
}

#[async_trait]
impl ObjectStore for S3Client {
    fn resolve_bucket(&self, name: &str) -> Result<BucketRef> {
        validate_bucket_name(name)?;
        Ok(BucketRef::new(name))
    }

    async fn list_objects(&self, bucket: &BucketRef, options: ListOptions) -> Result<ListResult> {
        let mut request = self.inner.list_objects_v2().bucket(bucket.name());

        if let Some(prefix) = options.prefix {
            request = request.prefix(prefix);
        }

        if let Some(delimiter) = options.delimiter {
            request = request.delimiter(delimiter);
        }

        if let Some(marker) = options.marker {
            request = request.start_after(marker);
        }

        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, &format!("list bucket '{bucket}'")))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix().map(str::to_string))
            .collect();

        Ok(ListResult {
            keys,
            common_prefixes,
            truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn create_bucket(&self, bucket: &BucketRef, acl: CannedAcl) -> Result<()> {
        let mut request = self
            .inner
            .create_bucket()
            .bucket(bucket.name())
            .acl(bucket_acl(acl));

        if self.region != US_EAST_1 {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(configuration);
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(
                    bucket = %bucket,
                    region = %self.region,
                    acl = acl.as_str(),
                    "Created bucket"
                );
                Ok(())
            }
            Err(e)
                if e.as_service_error().and_then(|s| s.code()) == Some("BucketAlreadyOwnedByYou") =>
            {
                tracing::debug!(bucket = %bucket, "Bucket already owned by this account");
                Ok(())
            }
            Err(e) => Err(Self::map_sdk_error(&e, &format!("create bucket '{bucket}'"))),
        }
    }

    async fn put_object(
        &self,
        bucket: &BucketRef,
        key: &str,
        source: SourceFile,
        content_type: &str,
        acl: CannedAcl,
    ) -> Result<()> {
        let length = source.length;
        let body = ByteStream::read_from()
            .file(source.file)
            .length(Length::Exact(length))
            .build()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let content_length = i64::try_from(length)
            .map_err(|_| Error::General(format!("file too large for '{key}': {length} bytes")))?;

        self.inner
            .put_object()
            .bucket(bucket.name())
            .key(key)
            .body(body)
            .content_length(content_length)
            .content_type(content_type)
            .acl(object_acl(acl))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, &format!("put '{bucket}/{key}'")))?;

        tracing::debug!(bucket = %bucket, key, length, "Stored object");
        Ok(())
    }
}

/// Builds `S3Client`s for a backup plan
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Connector;

#[async_trait]
impl Connector for S3Connector {
    async fn connect(&self, settings: &Settings) -> Result<Box<dyn ObjectStore>> {
        let client = S3Client::new(settings).await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code() {
        let err = classify(Some("NoSuchBucket"), Some(404), "m".to_string());
        assert!(err.is_not_found());

        let err = classify(Some("InvalidAccessKeyId"), Some(403), "m".to_string());
        assert!(err.is_access_denied());

        let err = classify(Some("BucketAlreadyExists"), Some(409), "m".to_string());
        assert!(matches!(err, Error::Conflict(_)));

        let err = classify(Some("SlowDown"), Some(503), "m".to_string());
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_classify_by_status_without_code() {
        assert!(classify(None, Some(404), "m".to_string()).is_not_found());
        assert!(classify(None, Some(403), "m".to_string()).is_access_denied());
        assert!(matches!(
            classify(None, None, "dispatch failed".to_string()),
            Error::Network(msg) if msg == "dispatch failed"
        ));
    }

    #[test]
    fn test_acls_map_to_known_values() {
        for acl in [CannedAcl::BucketOwnerFullControl, CannedAcl::BucketOwnerRead] {
            assert!(!matches!(bucket_acl(acl), BucketCannedAcl::Unknown(_)), "{acl:?}");
            assert!(!matches!(object_acl(acl), ObjectCannedAcl::Unknown(_)), "{acl:?}");
        }
        assert_eq!(
            bucket_acl(CannedAcl::BucketOwnerFullControl),
            BucketCannedAcl::Private
        );
        assert_eq!(
            object_acl(CannedAcl::BucketOwnerRead).as_str(),
            "bucket-owner-read"
        );
    }

    #[test]
    fn test_valid_bucket_names() {
        for name in ["backups", "default-s3-backup-bucket", "my.bucket.2024", "abc"] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        let too_long = "a".repeat(64);
        for name in [
            "",
            "ab",
            "Uppercase",
            "under_score",
            "-leading",
            "trailing-",
            "double..dot",
            "192.168.1.1",
            too_long.as_str(),
        ] {
            assert!(
                matches!(validate_bucket_name(name), Err(Error::InvalidBucket(_))),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_bucket_uses_naming_rules() {
        let settings = Settings {
            region: "eu-central-1".to_string(),
            auth: s3backup_core::Auth {
                access_key: "AKIDEXAMPLE".to_string(),
                secret_key: "secret".to_string(),
                session_token: None,
            },
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        let client = S3Client::new(&settings).await.unwrap();

        assert_eq!(client.resolve_bucket("backups").unwrap().name(), "backups");
        assert!(client.resolve_bucket("Not_Valid").is_err());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_endpoint() {
        let settings = Settings {
            endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            S3Client::new(&settings).await,
            Err(Error::Config(_))
        ));
    }
}
