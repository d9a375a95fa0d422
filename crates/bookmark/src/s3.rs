//! S3-based bookmark storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;

use crate::store::{validate_stream_id, BookmarkStore};

/// S3 implementation of BookmarkStore trait.
///
/// Each stream's bookmark is a small text object at `{prefix}{stream_id}`.
/// S3 PUTs are atomic per object, so readers see either the old value or the
/// new one.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a store with credentials and region from the default AWS chain.
    pub async fn from_env(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config), bucket, prefix)
    }

    /// Object key for a stream's bookmark.
    pub fn key_for(&self, stream_id: &str) -> Result<String> {
        validate_stream_id(stream_id)?;
        Ok(format!("{}{stream_id}", self.prefix))
    }
}

#[async_trait]
impl BookmarkStore for S3Store {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        let key = self.key_for(stream_id)?;
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(anyhow::Error::new(service_err))
                    .with_context(|| format!("Failed to read s3://{}/{key}", self.bucket));
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{key}", self.bucket))?
            .into_bytes();
        let value = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("Bookmark s3://{}/{key} is not UTF-8", self.bucket))?;
        Ok(Some(value.trim().to_string()))
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        let key = self.key_for(stream_id)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(value.as_bytes().to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to write s3://{}/{key}", self.bucket))?;
        tracing::debug!("Stored bookmark {value} to s3://{}/{key}", self.bucket);
        Ok(())
    }
}
