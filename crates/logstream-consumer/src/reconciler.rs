use crate::pull_reader::PullReader;
use crate::push_reader::PushReader;
use crate::settings::ConsumerSettings;
use crate::Result;
use chrono::{DateTime, Utc};
use logstream_codec::blob::BlobStore;
use logstream_coordinator::CoordinatorStore;
use logstream_metrics::MetricsHandle;
use logstream_types::{ConsumerId, OwnedShard};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

struct RunningReader {
    stop: CancellationToken,
    lease_expiration: watch::Sender<Option<DateTime<Utc>>>,
    handle: tokio::task::JoinHandle<()>,
}

/// `ConsumerReconciler` (§4.5): reads `getOwnedShards` and brings the set of
/// running per-shard reader tasks in line with it. Invoked by the lease
/// coordinator whenever a tick changes ownership, plus once at startup.
pub struct ConsumerReconciler {
    store: Arc<dyn CoordinatorStore>,
    consumer_id: ConsumerId,
    stream_name: String,
    client: logstream_client::Client,
    settings: ConsumerSettings,
    metrics: MetricsHandle,
    blob_store: Option<Arc<dyn BlobStore>>,
    events: mpsc::UnboundedSender<crate::events::ConsumerEvent>,
    running: Mutex<HashMap<String, RunningReader>>,
}

impl ConsumerReconciler {
    pub fn new(
        store: Arc<dyn CoordinatorStore>,
        consumer_id: ConsumerId,
        stream_name: String,
        client: logstream_client::Client,
        settings: ConsumerSettings,
        metrics: MetricsHandle,
        blob_store: Option<Arc<dyn BlobStore>>,
        events: mpsc::UnboundedSender<crate::events::ConsumerEvent>,
    ) -> Self {
        Self {
            store,
            consumer_id,
            stream_name,
            client,
            settings,
            metrics,
            blob_store,
            events,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Starts readers for newly-owned shards, pushes the latest lease
    /// expiration into already-running ones via their `watch` channel, and
    /// stops readers for shards no longer owned. Stop failures are logged and
    /// otherwise swallowed.
    pub async fn reconcile(&self) -> Result<()> {
        let owned = self.store.get_owned_shards(&self.consumer_id).await?;
        let owned_by_id: HashMap<&str, &OwnedShard> = owned.iter().map(|o| (o.shard_id.as_str(), o)).collect();

        let mut running = self.running.lock().await;

        let to_stop: Vec<String> = running.keys().filter(|id| !owned_by_id.contains_key(id.as_str())).cloned().collect();
        for shard_id in to_stop {
            if let Some(entry) = running.remove(&shard_id) {
                entry.stop.cancel();
                if let Err(err) = entry.handle.await {
                    tracing::warn!(shard_id, error = %err, "reader task panicked while stopping");
                }
            }
        }

        for shard in &owned {
            if let Some(existing) = running.get(&shard.shard_id) {
                let _ = existing.lease_expiration.send(shard.lease_expiration);
                continue;
            }

            let stop = CancellationToken::new();
            let (lease_tx, lease_rx) = watch::channel(shard.lease_expiration);
            let enhanced_consumer = if self.settings.use_enhanced_fan_out {
                self.store.get_assigned_enhanced_consumer(&self.consumer_id).await?
            } else {
                None
            };

            if let Some(consumer_arn) = enhanced_consumer {
                let reader = Arc::new(PushReader::new(
                    self.client.clone(),
                    self.store.clone(),
                    self.stream_name.clone(),
                    shard.shard_id.clone(),
                    consumer_arn,
                    self.settings.clone(),
                    self.metrics.clone(),
                    self.blob_store.clone(),
                    self.events.clone(),
                    stop.clone(),
                    lease_rx,
                ));
                let handle = tokio::spawn(async move { reader.run().await });
                running.insert(shard.shard_id.clone(), RunningReader { stop, lease_expiration: lease_tx, handle });
            } else {
                let reader = Arc::new(PullReader::new(
                    self.client.clone(),
                    self.store.clone(),
                    self.stream_name.clone(),
                    shard.shard_id.clone(),
                    shard.checkpoint.clone(),
                    self.settings.clone(),
                    self.metrics.clone(),
                    self.blob_store.clone(),
                    self.events.clone(),
                    stop.clone(),
                    lease_rx,
                ));
                let handle = tokio::spawn(async move { reader.run().await });
                running.insert(shard.shard_id.clone(), RunningReader { stop, lease_expiration: lease_tx, handle });
            }
        }

        let _ = self.events.send(crate::events::ConsumerEvent::Stats {
            owned_shard_count: running.len(),
        });

        Ok(())
    }

    /// Cancels every running reader and awaits their exit. Used by `Facade::stop`.
    pub async fn stop_all(&self) {
        let mut running = self.running.lock().await;
        for (shard_id, entry) in running.drain() {
            entry.stop.cancel();
            if let Err(err) = entry.handle.await {
                tracing::warn!(shard_id, error = %err, "reader task panicked while stopping");
            }
        }
    }

    pub async fn owned_shard_count(&self) -> usize {
        self.running.lock().await.len()
    }
}
