//! S3-compatible object storage backend.
//!
//! Works against AWS S3 and self-hosted services such as `MinIO` or
//! `LocalStack`. When a custom endpoint is configured the client switches to
//! path-style addressing.
//!
//! Create-if-absent uses a conditional `PutObject` with `If-None-Match: *`
//! when [`S3Config::conditional_writes`] is set. Services that do not honour
//! the header fall back to the trait's read-then-write, which is not atomic.

use std::fmt;

use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::{StorageBackend, StorageError};

/// HTTP status returned when an `If-None-Match: *` precondition fails.
const PRECONDITION_FAILED: u16 = 412;

/// HTTP status some services return while a competing conditional write is
/// still in flight for the same key.
const CONDITIONAL_CONFLICT: u16 = 409;

const NOT_FOUND: u16 = 404;

/// Connection settings for [`S3Backend`].
#[derive(Clone)]
pub struct S3Config {
    /// Bucket that holds every Keeper object.
    pub bucket: String,
    /// Signing region (e.g. `us-east-1`).
    pub region: String,
    /// Custom endpoint URL. Enables path-style addressing when set.
    pub endpoint: Option<String>,
    /// Static access key id.
    pub access_key: String,
    /// Static secret access key.
    pub secret_key: String,
    /// Use `If-None-Match: *` for create-if-absent writes.
    pub conditional_writes: bool,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("conditional_writes", &self.conditional_writes)
            .finish()
    }
}

/// Storage backend that keeps one S3 object per key.
#[derive(Clone)]
pub struct S3Backend {
    client: aws_sdk_s3::Client,
    bucket: String,
    conditional_writes: bool,
}

impl S3Backend {
    /// Build a backend from the given settings without touching the network.
    #[must_use]
    pub fn new(config: &S3Config) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "keeper",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .behavior_version_latest();

        if let Some(ep) = &config.endpoint {
            builder = builder.endpoint_url(ep).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            conditional_writes: config.conditional_writes,
        }
    }

    /// Build a backend and verify that the bucket is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connect`] if the bucket cannot be reached with
    /// the configured credentials.
    pub async fn connect(config: &S3Config) -> Result<Self, StorageError> {
        let backend = Self::new(config);
        backend
            .client
            .head_bucket()
            .bucket(&backend.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Connect {
                endpoint: config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| format!("s3://{}", config.bucket)),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        info!(bucket = %backend.bucket, "connected to object storage");
        Ok(backend)
    }
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("conditional_writes", &self.conditional_writes)
            .finish_non_exhaustive()
    }
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

#[async_trait::async_trait]
impl StorageBackend for S3Backend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e)
                if e.as_service_error().is_some_and(GetObjectError::is_no_such_key)
                    || http_status(&e) == Some(NOT_FOUND) =>
            {
                return Ok(None);
            }
            Err(e) => {
                return Err(StorageError::Read {
                    key: key.to_owned(),
                    reason: DisplayErrorContext(&e).to_string(),
                });
            }
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })?
            .into_bytes();
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(value.to_vec()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_owned(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        if !self.conditional_writes {
            if self.exists(key).await? {
                return Ok(false);
            }
            self.put(key, value).await?;
            return Ok(true);
        }

        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(value.to_vec()))
            .content_type("application/json")
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e)
                if matches!(
                    http_status(&e),
                    Some(PRECONDITION_FAILED | CONDITIONAL_CONFLICT)
                ) =>
            {
                debug!(key, "conditional write rejected, object already present");
                Ok(false)
            }
            Err(e) => Err(StorageError::Write {
                key: key.to_owned(),
                reason: DisplayErrorContext(&e).to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_owned(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| StorageError::List {
                prefix: prefix.to_owned(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_owned)),
            );

            match (resp.is_truncated(), resp.next_continuation_token()) {
                (Some(true), Some(next)) => continuation = Some(next.to_owned()),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error().is_some_and(HeadObjectError::is_not_found)
                    || http_status(&e) == Some(NOT_FOUND) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: DisplayErrorContext(&e).to_string(),
            }),
        }
    }
}
