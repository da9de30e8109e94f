use crate::{Error, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};

/// The sentinel a large item's body is replaced with once offloaded, matching
/// the shape `{"@S3Item": {...}}` so a decoder can recognize it without a
/// dedicated framing byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ItemRef {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "eTag")]
    pub e_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ItemSentinel {
    #[serde(rename = "@S3Item")]
    pub item: S3ItemRef,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<S3ItemRef>;
    async fn get(&self, reference: &S3ItemRef) -> Result<Vec<u8>>;
}

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<S3ItemRef> {
        let out = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| Error::BlobStore {
                operation: "put_object",
                code: err.code().map(str::to_owned),
                message: err.message().unwrap_or_default().to_owned(),
            })?;

        Ok(S3ItemRef {
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            e_tag: out.e_tag.unwrap_or_default(),
        })
    }

    async fn get(&self, reference: &S3ItemRef) -> Result<Vec<u8>> {
        let out = self
            .client
            .get_object()
            .bucket(&reference.bucket)
            .key(&reference.key)
            .send()
            .await
            .map_err(|err| Error::BlobStore {
                operation: "get_object",
                code: err.code().map(str::to_owned),
                message: err.message().unwrap_or_default().to_owned(),
            })?;

        let bytes = out.body.collect().await.map_err(|err| Error::BlobStore {
            operation: "get_object",
            code: None,
            message: err.to_string(),
        })?;
        Ok(bytes.into_bytes().to_vec())
    }
}

/// Builds the deterministic offload key for a record belonging to `log_name`.
pub fn offload_key(log_name: &str) -> String {
    format!("{log_name}-{}.json", uuid::Uuid::new_v4())
}
