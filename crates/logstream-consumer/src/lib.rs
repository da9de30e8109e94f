//! Cooperative shard distribution across a consumer group (§4.3-§4.7):
//! heartbeating, lease acquisition, reconciliation of running readers, and
//! the pull/push reader implementations themselves.

mod error;
mod events;
mod heartbeat;
mod lease;
mod pull_reader;
mod push_reader;
mod reconciler;
pub mod settings;

pub use error::{Error, Result};
pub use events::{CheckpointSetter, ConsumerEvent, ContinuePolling};
pub use heartbeat::HeartbeatManager;
pub use reconciler::ConsumerReconciler;
pub use settings::ConsumerSettings;

use logstream_codec::blob::BlobStore;
use logstream_coordinator::CoordinatorStore;
use logstream_metrics::MetricsHandle;
use logstream_types::{Clock, ConsumerId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wires a heartbeat manager, lease coordinator, and reconciler together for
/// one `(group, logName)` consumer, and exposes its event stream. This is the
/// unit the top-level facade starts and stops per log it consumes.
pub struct ConsumerGroup {
    heartbeat: Arc<HeartbeatManager>,
    lease: Arc<lease::LeaseCoordinator>,
    reconciler: Arc<ConsumerReconciler>,
    tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ConsumerGroup {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: logstream_client::Client,
        store: Arc<dyn CoordinatorStore>,
        consumer_id: ConsumerId,
        app_name: String,
        host: String,
        stream_name: String,
        settings: ConsumerSettings,
        clock: Arc<dyn Clock>,
        metrics: MetricsHandle,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> (Self, mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let heartbeat = Arc::new(HeartbeatManager::new(
            store.clone(),
            consumer_id.clone(),
            app_name,
            host,
            settings.standalone,
            clock.clone(),
            settings.clone(),
        ));

        let lease = Arc::new(lease::LeaseCoordinator::new(
            client.clone(),
            store.clone(),
            consumer_id.clone(),
            stream_name.clone(),
            settings.clone(),
            clock,
            metrics.clone(),
        ));

        let reconciler = Arc::new(ConsumerReconciler::new(
            store,
            consumer_id,
            stream_name,
            client,
            settings,
            metrics,
            blob_store,
            events_tx,
        ));

        (
            Self {
                heartbeat,
                lease,
                reconciler,
                tasks: tokio::sync::Mutex::new(Vec::new()),
            },
            events_rx,
        )
    }

    /// Starts the heartbeat and lease-coordinator background tasks and runs
    /// one reconciliation pass immediately, so ownership from a prior process
    /// (if any) is picked up without waiting for the first lease tick.
    pub async fn start(&self) -> Result<()> {
        self.reconciler.reconcile().await?;

        let heartbeat_handle = self.heartbeat.clone().spawn();

        let reconciler = self.reconciler.clone();
        let lease_handle = self.lease.clone().spawn(move || {
            let reconciler = reconciler.clone();
            async move {
                if let Err(err) = reconciler.reconcile().await {
                    tracing::warn!(error = %err, "reconciliation after lease change failed");
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(heartbeat_handle);
        tasks.push(lease_handle);
        Ok(())
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.lease.stop_token()
    }

    /// Cancels the heartbeat and lease coordinator, stops every running
    /// reader, and awaits all background tasks.
    pub async fn stop(&self) {
        self.heartbeat.stop();
        self.lease.stop();
        self.reconciler.stop_all().await;

        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
    }

    pub async fn owned_shard_count(&self) -> usize {
        self.reconciler.owned_shard_count().await
    }
}
