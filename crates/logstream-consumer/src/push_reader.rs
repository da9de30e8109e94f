use crate::events::{CheckpointSetter, ConsumerEvent};
use crate::settings::ConsumerSettings;
use crate::Result;
use aws_sdk_kinesis::types::Record;
use chrono::{DateTime, Utc};
use logstream_codec::blob::BlobStore;
use logstream_codec::{decode, deaggregate, DecodedRecord, RawRecord};
use logstream_coordinator::CoordinatorStore;
use logstream_metrics::MetricsHandle;
use logstream_types::IteratorPosition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Holds one long-lived enhanced fan-out subscription open (§4.7), reconnecting
/// with a fixed backoff whenever the vendor's event stream ends, times out
/// idle, or the subscription's own ~5 minute lifetime expires.
pub struct PushReader {
    client: logstream_client::Client,
    store: Arc<dyn CoordinatorStore>,
    stream_name: String,
    shard_id: String,
    consumer_arn: String,
    settings: ConsumerSettings,
    metrics: MetricsHandle,
    blob_store: Option<Arc<dyn BlobStore>>,
    events: mpsc::UnboundedSender<ConsumerEvent>,
    stop: CancellationToken,
    lease_expiration: watch::Receiver<Option<DateTime<Utc>>>,
}

impl PushReader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: logstream_client::Client,
        store: Arc<dyn CoordinatorStore>,
        stream_name: String,
        shard_id: String,
        consumer_arn: String,
        settings: ConsumerSettings,
        metrics: MetricsHandle,
        blob_store: Option<Arc<dyn BlobStore>>,
        events: mpsc::UnboundedSender<ConsumerEvent>,
        stop: CancellationToken,
        lease_expiration: watch::Receiver<Option<DateTime<Utc>>>,
    ) -> Self {
        Self {
            client,
            store,
            stream_name,
            shard_id,
            consumer_arn,
            settings,
            metrics,
            blob_store,
            events,
            stop,
            lease_expiration,
        }
    }

    fn lease_expired(&self) -> bool {
        (*self.lease_expiration.borrow()).is_some_and(|expiration| Utc::now() > expiration)
    }

    pub async fn run(self: Arc<Self>) {
        let mut checkpoint: Option<String> = None;

        loop {
            if self.stop.is_cancelled() {
                return;
            }

            if self.lease_expired() {
                tracing::warn!(shard_id = %self.shard_id, "lease expired; stopping push reader");
                return;
            }

            let position = match &checkpoint {
                Some(seq) => IteratorPosition::AfterSequenceNumber(seq.clone()),
                None => self.settings.initial_position.clone(),
            };

            match self.run_subscription(position, &mut checkpoint).await {
                Ok(()) => {}
                Err(err) => {
                    let _ = self.events.send(ConsumerEvent::Error {
                        shard_id: Some(self.shard_id.clone()),
                        message: err.to_string(),
                    });
                }
            }

            if self.stop.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = self.stop.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }

    /// Drives a single subscription until it naturally ends (vendor-side expiry,
    /// idle timeout, or a protocol error), handing off the last observed
    /// sequence number so the caller resumes from where this subscription left
    /// off rather than restarting from `initial_position`.
    async fn run_subscription(&self, position: IteratorPosition, checkpoint: &mut Option<String>) -> Result<()> {
        let output = self.client.subscribe_to_shard(&self.consumer_arn, &self.shard_id, &position).await?;
        let mut stream = output.event_stream;
        let (checkpoint_tx, mut checkpoint_rx) = CheckpointSetter::new();
        let mut lease_expiration = self.lease_expiration.clone();

        loop {
            if self.lease_expired() {
                tracing::warn!(shard_id = %self.shard_id, "lease expired; aborting enhanced fan-out subscription");
                return Ok(());
            }

            let next = tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                _ = lease_expiration.changed() => {
                    if self.lease_expired() {
                        tracing::warn!(shard_id = %self.shard_id, "lease expired; aborting enhanced fan-out subscription");
                        return Ok(());
                    }
                    continue;
                }
                next = stream.recv() => next,
                _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                    tracing::debug!(shard_id = %self.shard_id, "enhanced fan-out subscription idle; reconnecting");
                    return Ok(());
                }
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(err) => {
                    tracing::warn!(shard_id = %self.shard_id, error = %err, "enhanced fan-out event stream error");
                    return Ok(());
                }
            };

            let Some(subscribe_event) = event.as_subscribe_to_shard_event().ok() else {
                continue;
            };

            self.metrics.record_get_records_call();
            let records = subscribe_event.records.clone();
            let millis_behind_latest = subscribe_event.millis_behind_latest.unwrap_or_default();

            if !records.is_empty() {
                let decoded = self.decode_batch(records).await?;
                let last_sequence = decoded.last().map(|r| r.sequence_number.clone());

                let checkpoint_setter = (!self.settings.use_auto_checkpoints).then(|| checkpoint_tx.clone());

                let _ = self.events.send(ConsumerEvent::Records {
                    shard_id: self.shard_id.clone(),
                    log_name: self.stream_name.clone(),
                    records: decoded,
                    millis_behind_latest,
                    continuation_sequence_number: subscribe_event.continuation_sequence_number.clone(),
                    checkpoint: checkpoint_setter,
                    continue_polling: None,
                });

                if self.settings.use_auto_checkpoints {
                    if let Some(seq) = last_sequence {
                        self.store.store_shard_checkpoint(&self.shard_id, &seq).await?;
                        *checkpoint = Some(seq);
                    }
                } else {
                    while let Ok(seq) = checkpoint_rx.try_recv() {
                        self.store.store_shard_checkpoint(&self.shard_id, &seq).await?;
                        *checkpoint = Some(seq);
                    }
                }
            }

            if subscribe_event.child_shards.as_ref().is_some_and(|c| !c.is_empty()) {
                self.store.mark_shard_as_depleted(&self.shard_id, &[]).await?;
                return Ok(());
            }
        }
    }

    async fn decode_batch(&self, records: Vec<Record>) -> Result<Vec<DecodedRecord>> {
        let mut decoded = Vec::with_capacity(records.len());
        for record in records {
            let raw = RawRecord {
                data: record.data.into_inner(),
                partition_key: record.partition_key,
                sequence_number: record.sequence_number,
                approximate_arrival_timestamp: record
                    .approximate_arrival_timestamp
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())),
                encryption_type: record.encryption_type.map(|t| t.as_str().to_owned()),
            };

            for sub in deaggregate(&raw)? {
                let sub_raw = RawRecord {
                    data: sub.data,
                    partition_key: sub.partition_key,
                    sequence_number: sub.sequence_number,
                    approximate_arrival_timestamp: sub.approximate_arrival_timestamp,
                    encryption_type: raw.encryption_type.clone(),
                };
                decoded.push(decode(&self.settings.codec, self.blob_store.as_deref(), sub_raw).await?);
            }
        }
        Ok(decoded)
    }
}
