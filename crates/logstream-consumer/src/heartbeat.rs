use crate::settings::ConsumerSettings;
use logstream_coordinator::CoordinatorStore;
use logstream_types::{Clock, ConsumerId, ConsumerMetadata};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Periodic task (§4.3): refreshes this instance's liveness record and evicts
/// peers whose heartbeat has gone stale. Failures are logged and the loop
/// continues; they never surface to the caller.
pub struct HeartbeatManager {
    store: Arc<dyn CoordinatorStore>,
    consumer_id: ConsumerId,
    app_name: String,
    host: String,
    standalone: bool,
    clock: Arc<dyn Clock>,
    settings: ConsumerSettings,
    stop: CancellationToken,
}

impl HeartbeatManager {
    pub fn new(
        store: Arc<dyn CoordinatorStore>,
        consumer_id: ConsumerId,
        app_name: String,
        host: String,
        standalone: bool,
        clock: Arc<dyn Clock>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            store,
            consumer_id,
            app_name,
            host,
            standalone,
            clock,
            settings,
            stop: CancellationToken::new(),
        }
    }

    /// Spawns the periodic task, returning a handle to await its exit.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    async fn run(&self) {
        let started_at = self.clock.now();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return,
                _ = tokio::time::sleep(self.settings.heartbeat_interval) => {}
            }

            let metadata = ConsumerMetadata {
                app_name: self.app_name.clone(),
                host: self.host.clone(),
                pid: std::process::id(),
                started_at,
                heartbeat: self.clock.now(),
                is_active: true,
                is_standalone: self.standalone,
            };

            if let Err(err) = self.store.register_consumer(&self.consumer_id, metadata).await {
                tracing::warn!(error = %err, "failed to register heartbeat");
            }

            if let Err(err) = self.store.clear_old_consumers(self.settings.heartbeat_failure_timeout).await {
                tracing::warn!(error = %err, "failed to clear stale consumers");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use logstream_coordinator::FakeCoordinatorStore;
    use logstream_types::SystemClock;

    #[tokio::test(start_paused = true)]
    async fn registers_consumer_on_each_tick() {
        let store: Arc<dyn CoordinatorStore> = Arc::new(FakeCoordinatorStore::new());
        let manager = Arc::new(HeartbeatManager::new(
            store.clone(),
            "consumer-a".into(),
            "app".into(),
            "host".into(),
            false,
            Arc::new(SystemClock),
            ConsumerSettings {
                heartbeat_interval: std::time::Duration::from_millis(10),
                ..Default::default()
            },
        ));
        let handle = manager.clone().spawn();

        tokio::time::sleep(std::time::Duration::from_millis(35)).await;
        manager.stop();
        handle.await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.consumers.contains_key("consumer-a"));
    }
}
