use crate::events::{CheckpointSetter, ConsumerEvent, ContinuePolling};
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
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Polls one shard via `get-shard-iterator`/`get-records` (§4.6). Not a
/// literal state machine type: the states (obtaining an iterator, fetching,
/// emitting, waiting on a paused-polling signal, backing off) are the loop's
/// control flow rather than an explicit enum, matching how retried calls are
/// already modeled as plain loops in the client crate.
pub struct PullReader {
    client: logstream_client::Client,
    store: Arc<dyn CoordinatorStore>,
    stream_name: String,
    shard_id: String,
    initial_checkpoint: Option<String>,
    settings: ConsumerSettings,
    metrics: MetricsHandle,
    blob_store: Option<Arc<dyn BlobStore>>,
    events: mpsc::UnboundedSender<ConsumerEvent>,
    stop: CancellationToken,
    lease_expiration: watch::Receiver<Option<DateTime<Utc>>>,
}

impl PullReader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: logstream_client::Client,
        store: Arc<dyn CoordinatorStore>,
        stream_name: String,
        shard_id: String,
        initial_checkpoint: Option<String>,
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
            initial_checkpoint,
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

    /// `stopConsumer` (§4.6): terminates this reader's loop. The coordinator
    /// store itself is left untouched; the next reconcile tick will simply
    /// observe the shard is no longer owned and won't restart a reader for it.
    fn stop_consumer(&self, reason: &str) {
        tracing::warn!(shard_id = %self.shard_id, reason, "lease expired; stopping pull reader");
    }

    pub async fn run(self: Arc<Self>) {
        if let Err(err) = self.run_inner().await {
            let _ = self.events.send(ConsumerEvent::Error {
                shard_id: Some(self.shard_id.clone()),
                message: err.to_string(),
            });
        }
    }

    async fn run_inner(&self) -> Result<()> {
        if self.lease_expired() {
            self.stop_consumer("lease already expired at start");
            return Ok(());
        }

        let (checkpoint_tx, mut checkpoint_rx) = CheckpointSetter::new();
        let mut last_checkpointed = self.initial_checkpoint.clone();
        let mut last_emitted = self.initial_checkpoint.clone();
        let mut iterator = self.obtain_iterator(self.initial_checkpoint.clone()).await?;

        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            if self.lease_expired() {
                self.stop_consumer("lease expired");
                return Ok(());
            }

            self.metrics.record_get_records_call();
            let fetch = self.client.get_records(&iterator, self.settings.limit).await;

            let (records, next_iterator, millis_behind_latest) = match fetch {
                Ok(out) => out,
                Err(err) if err.code() == Some("ExpiredIteratorException") => {
                    iterator = self.obtain_iterator(last_emitted.clone()).await?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let was_empty = records.is_empty();

            if !was_empty {
                let decoded = self.decode_batch(records).await?;
                let last_sequence = decoded.last().map(|r| r.sequence_number.clone());

                let checkpoint = (!self.settings.use_auto_checkpoints).then(|| checkpoint_tx.clone());
                let (continue_polling, continue_rx) = if self.settings.use_paused_polling {
                    let (setter, rx) = ContinuePolling::new();
                    (Some(setter), Some(rx))
                } else {
                    (None, None)
                };

                let _ = self.events.send(ConsumerEvent::Records {
                    shard_id: self.shard_id.clone(),
                    log_name: self.stream_name.clone(),
                    records: decoded,
                    millis_behind_latest,
                    continuation_sequence_number: next_iterator.clone(),
                    checkpoint,
                    continue_polling,
                });

                last_emitted = last_sequence.clone().or(last_emitted);

                if self.settings.use_auto_checkpoints {
                    if let Some(seq) = last_sequence {
                        self.store.store_shard_checkpoint(&self.shard_id, &seq).await?;
                        last_checkpointed = Some(seq);
                    }
                } else {
                    while let Ok(seq) = checkpoint_rx.try_recv() {
                        self.store.store_shard_checkpoint(&self.shard_id, &seq).await?;
                        last_checkpointed = Some(seq);
                    }
                }

                if let Some(rx) = continue_rx {
                    tokio::select! {
                        _ = self.stop.cancelled() => return Ok(()),
                        _ = rx => {}
                    }
                }
            }

            match next_iterator {
                Some(next) => iterator = next,
                None => {
                    self.store.mark_shard_as_depleted(&self.shard_id, &[]).await?;
                    return Ok(());
                }
            }

            let delay = if was_empty {
                if millis_behind_latest > 0 {
                    tracing::debug!(shard_id = %self.shard_id, "fast-forwarding");
                    std::time::Duration::ZERO
                } else {
                    self.settings.no_records_poll_delay
                }
            } else {
                self.settings.poll_delay
            };
            tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn obtain_iterator(&self, resume_from: Option<String>) -> Result<String> {
        let position = match resume_from {
            Some(seq) => IteratorPosition::AfterSequenceNumber(seq),
            None => self.settings.initial_position.clone(),
        };

        match self.client.get_shard_iterator(&self.stream_name, &self.shard_id, &position).await {
            Ok(iterator) => Ok(iterator),
            Err(err) if matches!(position, IteratorPosition::AfterSequenceNumber(_)) && err.code() == Some("InvalidArgumentException") => {
                tracing::warn!(shard_id = %self.shard_id, "checkpoint rejected by the stream as invalid; resuming from LATEST");
                Ok(self
                    .client
                    .get_shard_iterator(&self.stream_name, &self.shard_id, &IteratorPosition::Latest)
                    .await?)
            }
            Err(err) => Err(err.into()),
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

#[cfg(test)]
mod test {
    use super::ConsumerSettings;
    use logstream_types::IteratorPosition;

    #[test]
    fn default_settings_start_from_latest() {
        assert_eq!(ConsumerSettings::default().initial_position, IteratorPosition::Latest);
    }
}
