//! AWS S3 / MinIO object-store adapter (feature `s3`).
//!
//! Implements the kernel `ObjectStore` trait over the official `aws-sdk-s3`
//! crate. Setting `endpoint_url` points the adapter at any S3-compatible
//! service (MinIO, Ceph, LocalStack).
//!
//! # Authentication
//!
//! Credentials resolve in the standard AWS order: environment variables →
//! shared credentials file → instance profile. For MinIO set
//! `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` in the environment.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Builder as S3Builder;
use aws_sdk_s3::primitives::DateTime as AwsDateTime;
use chrono::{DateTime, TimeZone, Utc};
use refract_kernel::storage::{
    ByteRange, GetOptions, ObjectGet, ObjectStore, ObjectStoreError, StoredObject,
};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct S3Config {
    /// AWS region (e.g. `"us-east-1"`).
    pub region: String,
    /// Bucket holding source images.
    pub bucket: String,
    /// Custom endpoint URL for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Path-style addressing (required by MinIO). Enabled automatically when
    /// `endpoint_url` is set.
    pub force_path_style: bool,
}

impl S3Config {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            endpoint_url: None,
            force_path_style: false,
        }
    }

    /// Override the endpoint URL; enables path-style addressing.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self.force_path_style = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// S3ObjectStore
// ─────────────────────────────────────────────────────────────────────────────

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build the store, loading credentials through the SDK chain.
    pub async fn new(config: S3Config) -> Self {
        let region = aws_sdk_s3::config::Region::new(config.region.clone());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = S3Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str, opts: &GetOptions) -> Result<ObjectGet, ObjectStoreError> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);

        if let Some(only_if) = &opts.only_if {
            if let Some(etag) = &only_if.etag_does_not_match {
                request = request.if_none_match(etag);
            }
            if let Some(since) = only_if.uploaded_after {
                request = request.if_modified_since(AwsDateTime::from_secs(since.timestamp()));
            }
        }
        if let Some(range) = opts.range {
            request = request.range(range_header(range));
        }

        let output = match request.send().await {
            Ok(output) => output,
            Err(err) => {
                // The service reports a satisfied precondition as HTTP 304
                // and a missing key as NoSuchKey; both are outcomes, not
                // failures.
                if let Some(raw) = err.raw_response() {
                    if raw.status().as_u16() == 304 {
                        return Ok(ObjectGet::NotModified { etag: None });
                    }
                    if raw.status().as_u16() == 404 {
                        return Ok(ObjectGet::Missing);
                    }
                }
                return Err(ObjectStoreError::Backend(err.to_string()));
            }
        };

        let etag = output.e_tag().map(|s| s.trim_matches('"').to_string());
        let uploaded = output.last_modified().map(aws_to_chrono);
        let content_type = output.content_type().map(str::to_string);
        let cache_control = output.cache_control().map(str::to_string);
        // Total object size: content-range total for partial reads, else the
        // content length.
        let total_size = output
            .content_range()
            .and_then(|cr| cr.rsplit_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok())
            .or_else(|| output.content_length().map(|l| l as u64));

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
            .into_bytes();

        Ok(ObjectGet::Found(StoredObject {
            size: total_size.unwrap_or(body.len() as u64),
            body,
            etag,
            uploaded,
            content_type,
            cache_control,
        }))
    }
}

fn range_header(range: ByteRange) -> String {
    match range {
        ByteRange::Offset {
            offset,
            length: Some(length),
        } => format!("bytes={}-{}", offset, offset + length - 1),
        ByteRange::Offset { offset, length: None } => format!("bytes={offset}-"),
        ByteRange::Suffix { length } => format!("bytes=-{length}"),
    }
}

fn aws_to_chrono(dt: &AwsDateTime) -> DateTime<Utc> {
    Utc.timestamp_opt(dt.secs(), dt.subsec_nanos())
        .single()
        .unwrap_or_else(Utc::now)
}
