//! A single long-lived facade wiring the log client, coordinator store,
//! codec, and consumer-group distribution layer into one object: start,
//! write, and a single logical stream of decoded events.

mod config;
mod error;

pub use config::{ClientConfig, EncryptionConfig, InitialPositionInStream};
pub use error::{ConfigError, Error, Result};
pub use logstream_consumer::ConsumerEvent;

use logstream_client::ops::{PutRecordsEntry, PutRecordsEntryResult};
use logstream_codec::blob::{BlobStore, S3BlobStore};
use logstream_codec::{encode, EncodeRequest, RecordPayload};
use logstream_coordinator::{CoordinatorStore, DynamoCoordinatorStore};
use logstream_metrics::MetricsHandle;
use logstream_types::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The object applications construct and hold for the lifetime of their use
/// of the log: one per `(consumerGroup, logName)`.
pub struct Facade {
    client: logstream_client::Client,
    config: ClientConfig,
    metrics: MetricsHandle,
    blob_store: Option<Arc<dyn BlobStore>>,
    group: logstream_consumer::ConsumerGroup,
    _log_guard: tracing::subscriber::DefaultGuard,
}

impl Facade {
    /// Resolves AWS credentials from the default provider chain, ensures the
    /// log (and, if configured, its enhanced consumers and encryption) exist,
    /// initializes the coordinator document, and returns the facade together
    /// with its output event receiver. Does not yet start background tasks;
    /// call [`Facade::start`] for that.
    pub async fn new(config: ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<ConsumerEvent>)> {
        let config = config.build()?;
        let log_guard = logstream_observability::install(logstream_observability::LogFormat::Pretty);

        let shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let metrics = MetricsHandle::new();

        let kinesis = aws_sdk_kinesis::Client::new(&shared_config);
        let client = logstream_client::Client::new(kinesis, metrics.clone(), config.capture_stack_trace);

        let dynamo = aws_sdk_dynamodb::Client::new(&shared_config);
        let store: Arc<dyn CoordinatorStore> = Arc::new(DynamoCoordinatorStore::new(
            dynamo,
            config.coordinator_table_name.clone(),
            config.consumer_group.clone(),
            config.log_name.clone(),
        ));
        store.init_state().await?;

        let blob_store: Option<Arc<dyn BlobStore>> = if config.use_s3_for_large_items {
            let bucket = config.s3_bucket.clone().expect("validated by ClientConfig::build");
            let s3 = aws_sdk_s3::Client::new(&shared_config);
            Some(Arc::new(S3BlobStore::new(s3, bucket)))
        } else {
            None
        };

        if config.create_stream_if_needed {
            client.create_stream(&config.log_name, config.shard_count).await?;
            client.wait_for_stream(&config.log_name, true, Duration::from_millis(500)).await?;
        }
        if !config.tags.is_empty() {
            client.add_tags_to_stream(&config.log_name, &config.tags).await?;
        }
        if let Some(encryption) = &config.encryption {
            client
                .start_stream_encryption(&config.log_name, &encryption.key_id, aws_sdk_kinesis::types::EncryptionType::Kms)
                .await?;
        }

        let consumer_id = format!("{}-{}", hostname(), uuid::Uuid::new_v4());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (group, events) = logstream_consumer::ConsumerGroup::new(
            client.clone(),
            store,
            consumer_id,
            config.consumer_group.clone(),
            hostname(),
            config.log_name.clone(),
            config.consumer_settings(),
            clock,
            metrics.clone(),
            blob_store.clone(),
        );

        Ok((
            Self {
                client,
                config,
                metrics,
                blob_store,
                group,
                _log_guard: log_guard,
            },
            events,
        ))
    }

    /// Starts the heartbeat, lease coordinator, and reconciler background tasks.
    pub async fn start(&self) -> Result<()> {
        self.group.start().await?;
        Ok(())
    }

    /// Cancels every background task (heartbeat, lease coordinator, readers)
    /// and tears down the metrics handle.
    pub async fn stop(&self) {
        self.group.stop().await;
        self.metrics.shutdown();
    }

    /// Writes one record, running it through the codec's encode path
    /// (compression, S3 offload, partition-key derivation) before submission.
    pub async fn put_record(&self, payload: RecordPayload, partition_key: Option<String>) -> Result<PutRecordsEntryResult> {
        let encoded = encode(
            &self.config.codec_config(),
            self.blob_store.as_deref(),
            &self.config.log_name,
            EncodeRequest {
                data: Some(payload),
                partition_key,
                ..EncodeRequest::default()
            },
        )
        .await?;
        self.metrics.record_written(1);
        Ok(self
            .client
            .put_record(&self.config.log_name, encoded.data, &encoded.partition_key)
            .await?)
    }

    /// Writes a batch of records, each independently run through the codec's
    /// encode path, in one `put-records` call (retried per-entry on partial failure).
    pub async fn put_records(&self, payloads: Vec<(RecordPayload, Option<String>)>) -> Result<Vec<PutRecordsEntryResult>> {
        let mut entries = Vec::with_capacity(payloads.len());
        for (payload, partition_key) in payloads {
            let encoded = encode(
                &self.config.codec_config(),
                self.blob_store.as_deref(),
                &self.config.log_name,
                EncodeRequest {
                    data: Some(payload),
                    partition_key,
                    ..EncodeRequest::default()
                },
            )
            .await?;
            entries.push(PutRecordsEntry {
                data: encoded.data,
                partition_key: encoded.partition_key,
                explicit_hash_key: None,
            });
        }
        let count = entries.len() as u64;
        let results = self.client.put_records(&self.config.log_name, entries).await?;
        self.metrics.record_written(count);
        Ok(results)
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub async fn owned_shard_count(&self) -> usize {
        self.group.owned_shard_count().await
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}
