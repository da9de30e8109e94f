use crate::{Client, Result};
use aws_sdk_kinesis::types::{EncryptionType, StreamStatus, Tag};
use std::collections::HashMap;
use std::time::Duration;

impl Client {
    /// `describe-stream` (retried).
    pub async fn describe_stream(&self, stream_name: &str) -> Result<aws_sdk_kinesis::types::StreamDescription> {
        let out = self
            .run("describe_stream", self.retried_policy(), || {
                self.kinesis.describe_stream().stream_name(stream_name).send()
            })
            .await?;
        Ok(out.stream_description)
    }

    /// `create-stream` (non-retried). Swallows the "already exists" error, matching
    /// the source behaviour of tolerating a racing creator.
    pub async fn create_stream(&self, stream_name: &str, shard_count: i32) -> Result<()> {
        let result = self
            .run("create_stream", self.non_retried_policy(), || {
                self.kinesis
                    .create_stream()
                    .stream_name(stream_name)
                    .shard_count(shard_count)
                    .send()
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("ResourceInUseException") => {
                tracing::debug!(stream_name, "stream already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// `start-encryption` (non-retried). Swallows the "already encrypted" error.
    pub async fn start_stream_encryption(
        &self,
        stream_name: &str,
        key_id: &str,
        encryption_type: EncryptionType,
    ) -> Result<()> {
        let result = self
            .run("start_stream_encryption", self.non_retried_policy(), || {
                self.kinesis
                    .start_stream_encryption()
                    .stream_name(stream_name)
                    .key_id(key_id)
                    .encryption_type(encryption_type.clone())
                    .send()
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("ResourceInUseException") => {
                tracing::debug!(stream_name, "stream encryption already in that state");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// `add-tags` (non-retried).
    pub async fn add_tags_to_stream(&self, stream_name: &str, tags: &HashMap<String, String>) -> Result<()> {
        self.run("add_tags_to_stream", self.non_retried_policy(), || {
            self.kinesis
                .add_tags_to_stream()
                .stream_name(stream_name)
                .set_tags(Some(tags.clone()))
                .send()
        })
        .await?;
        Ok(())
    }

    /// `list-tags` (retried).
    pub async fn list_tags_for_stream(&self, stream_name: &str) -> Result<Vec<Tag>> {
        let out = self
            .run("list_tags_for_stream", self.retried_policy(), || {
                self.kinesis.list_tags_for_stream().stream_name(stream_name).send()
            })
            .await?;
        Ok(out.tags)
    }

    /// Polls `describe-stream` until the stream reaches `Active` (`exists`) or is no
    /// longer found (`not_exists`). There is no vendor-native waiter for this
    /// operation, so this re-derives one from the retried `describe` call.
    pub async fn wait_for_stream(&self, stream_name: &str, exists: bool, poll: Duration) -> Result<()> {
        loop {
            match self.describe_stream(stream_name).await {
                Ok(desc) if exists && desc.stream_status == StreamStatus::Active => return Ok(()),
                Ok(_) if exists => {
                    tokio::time::sleep(poll).await;
                }
                Ok(_) => {
                    // Still exists but caller wants it gone; keep polling.
                    tokio::time::sleep(poll).await;
                }
                Err(err) if !exists && err.code() == Some("ResourceNotFoundException") => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}
