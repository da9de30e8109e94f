use crate::settings::ConsumerSettings;
use crate::Result;
use logstream_coordinator::{CoordinatorStore, LockOutcome, ReleaseOutcome};
use logstream_metrics::MetricsHandle;
use logstream_types::{Clock, ConsumerGroupState, ConsumerId, ShardState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Periodic task (§4.4): folds the log's shard listing into the coordinator
/// store, evaluates lease eligibility per shard, and triggers reconciliation
/// when ownership changes.
pub struct LeaseCoordinator {
    client: logstream_client::Client,
    store: Arc<dyn CoordinatorStore>,
    consumer_id: ConsumerId,
    stream_name: String,
    settings: ConsumerSettings,
    clock: Arc<dyn Clock>,
    metrics: MetricsHandle,
    partial_failure: AtomicBool,
    stop: CancellationToken,
}

impl LeaseCoordinator {
    pub fn new(
        client: logstream_client::Client,
        store: Arc<dyn CoordinatorStore>,
        consumer_id: ConsumerId,
        stream_name: String,
        settings: ConsumerSettings,
        clock: Arc<dyn Clock>,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            client,
            store,
            consumer_id,
            stream_name,
            settings,
            clock,
            metrics,
            partial_failure: AtomicBool::new(false),
            stop: CancellationToken::new(),
        }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Spawns the periodic loop. `on_changed` is invoked whenever a tick
    /// detects a change (or a prior partial failure); it is expected to kick
    /// off `ConsumerReconciler::reconcile`.
    pub fn spawn<F, Fut>(self: Arc<Self>, mut on_changed: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            loop {
                let interval = if self.partial_failure.load(Ordering::Relaxed) {
                    self.settings.acquire_leases_retry_interval
                } else {
                    self.settings.acquire_leases_interval
                };

                tokio::select! {
                    _ = self.stop.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                match self.tick().await {
                    Ok(changed) => {
                        self.partial_failure.store(false, Ordering::Relaxed);
                        if changed {
                            on_changed().await;
                        }
                    }
                    Err(crate::Error::LogGone) => {
                        tracing::warn!(stream = %self.stream_name, "log no longer exists; stopping lease coordinator");
                        self.stop.cancel();
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "lease coordinator tick failed");
                        self.partial_failure.store(true, Ordering::Relaxed);
                    }
                }
            }
        })
    }

    async fn tick(&self) -> Result<bool> {
        if self.client.describe_stream(&self.stream_name).await.is_err() {
            return Err(crate::Error::LogGone);
        }

        if self.settings.use_enhanced_fan_out {
            let assigned = self.store.get_assigned_enhanced_consumer(&self.consumer_id).await?;
            if assigned.is_none() {
                let snapshot = self.store.snapshot().await?;
                let unassigned = snapshot.enhanced_consumers.iter().find(|(_, c)| c.is_used_by.is_none());
                match unassigned {
                    Some((name, consumer)) => {
                        let _ = self
                            .store
                            .lock_stream_consumer(name, &self.consumer_id, &consumer.version)
                            .await?;
                    }
                    None => return Ok(false),
                }
            }
        }

        let shards = self.client.list_shards(&self.stream_name).await?;
        for shard in &shards {
            self.store.get_shard_and_stream_state(&shard.shard_id, shard).await?;
        }

        let group = self.store.snapshot().await?;
        let mut own = group.active_lease_count(&self.consumer_id);
        let mut changed = false;

        for shard in &shards {
            if acquire_lease(
                self.store.as_ref(),
                &self.settings,
                self.clock.as_ref(),
                &group,
                &self.consumer_id,
                &shard.shard_id,
                &mut own,
            )
            .await?
            {
                changed = true;
                self.metrics.record_lease_acquired();
            }
        }

        Ok(changed)
    }
}

/// `acquireLease(shardId, shardDesc)` (§4.4.1), evaluated against a snapshot
/// taken once at the start of the tick. `own` is threaded through the whole
/// shard loop so the `maxActive` check sees a running count, not a stale one.
async fn acquire_lease(
    store: &dyn CoordinatorStore,
    settings: &ConsumerSettings,
    clock: &dyn Clock,
    group: &ConsumerGroupState,
    consumer_id: &str,
    shard_id: &str,
    own: &mut usize,
) -> Result<bool> {
    let Some(s) = group.shards.get(shard_id) else {
        return Ok(false);
    };

    if s.depleted {
        return Ok(false);
    }

    let now = clock.now();
    let mut owner = s.lease_owner.clone();
    let mut expiration = s.lease_expiration;
    let version = s.version.clone();

    if owner.as_deref() == Some(consumer_id) {
        let renewal_cutoff = expiration.map(|exp| exp - renewal_offset(settings));
        if renewal_cutoff.is_some_and(|cutoff| now > cutoff) {
            *own = own.saturating_sub(1);
            owner = None;
            expiration = None;
        } else {
            return Ok(false);
        }
    }

    let expired = expiration.is_some_and(|exp| now > exp);
    let orphaned = owner.as_ref().is_some_and(|o| !group.consumers.contains_key(o));

    if expired || orphaned {
        match store.release_shard_lease(shard_id, &version).await? {
            ReleaseOutcome::Released(_) => {
                owner = None;
            }
            ReleaseOutcome::Conflict => return Ok(true),
        }
    }

    if owner.is_some() {
        return Ok(false);
    }

    if has_live_parent(s, group) {
        return Ok(false);
    }

    if !settings.standalone {
        let non_depleted = group.non_depleted_shard_count().max(1);
        let active_consumers = group.active_non_standalone_consumer_count().max(1);
        let max_active = non_depleted.div_ceil(active_consumers);
        if *own + 1 > max_active {
            return Ok(true);
        }
    }

    match store.lock_shard_lease(shard_id, consumer_id, settings.lease_term, &version).await? {
        LockOutcome::Acquired(_) => {
            *own += 1;
            Ok(true)
        }
        LockOutcome::Conflict => Ok(false),
    }
}

fn has_live_parent(s: &ShardState, group: &ConsumerGroupState) -> bool {
    s.parent.iter().any(|parent_id| group.shards.get(parent_id).is_some_and(|p| !p.depleted))
}

fn renewal_offset(settings: &ConsumerSettings) -> chrono::Duration {
    chrono::Duration::from_std(settings.lease_term)
        .unwrap_or_default()
        .checked_mul((settings.lease_renewal_offset_fraction * 1000.0) as i32)
        .unwrap_or_default()
        / 1000
}

#[cfg(test)]
mod test {
    use super::*;
    use logstream_coordinator::FakeCoordinatorStore;
    use logstream_types::{ConsumerMetadata, ShardDescriptor, SystemClock};

    fn descriptor(id: &str) -> ShardDescriptor {
        ShardDescriptor {
            shard_id: id.into(),
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
            starting_sequence_number: "0".into(),
            is_closed: false,
        }
    }

    #[tokio::test]
    async fn acquires_an_unowned_shard() {
        let store = FakeCoordinatorStore::new();
        let clock = SystemClock;
        let desc = descriptor("shard-0");
        store.get_shard_and_stream_state("shard-0", &desc).await.unwrap();
        store
            .register_consumer(
                "consumer-a",
                ConsumerMetadata {
                    app_name: "app".into(),
                    host: "host".into(),
                    pid: 1,
                    started_at: chrono::Utc::now(),
                    heartbeat: chrono::Utc::now(),
                    is_active: true,
                    is_standalone: false,
                },
            )
            .await
            .unwrap();

        let group = store.snapshot().await.unwrap();
        let mut own = 0;
        let changed = acquire_lease(&store, &ConsumerSettings::default(), &clock, &group, "consumer-a", "shard-0", &mut own)
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(own, 1);
        let owned = store.get_owned_shards("consumer-a").await.unwrap();
        assert_eq!(owned.len(), 1);
    }

    #[tokio::test]
    async fn skips_a_shard_with_a_non_depleted_parent() {
        let store = FakeCoordinatorStore::new();
        let clock = SystemClock;
        let mut parent_desc = descriptor("shard-0");
        parent_desc.is_closed = true;
        store.get_shard_and_stream_state("shard-0", &parent_desc).await.unwrap();

        let mut child_desc = descriptor("shard-1");
        child_desc.parent_shard_id = Some("shard-0".into());
        store.get_shard_and_stream_state("shard-1", &child_desc).await.unwrap();

        let group = store.snapshot().await.unwrap();
        let mut own = 0;
        let changed = acquire_lease(&store, &ConsumerSettings::default(), &clock, &group, "consumer-a", "shard-1", &mut own)
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(own, 0);
    }

    #[tokio::test]
    async fn depleted_shard_is_never_leased() {
        let store = FakeCoordinatorStore::new();
        let clock = SystemClock;
        let desc = descriptor("shard-0");
        store.get_shard_and_stream_state("shard-0", &desc).await.unwrap();
        store.mark_shard_as_depleted("shard-0", &[]).await.unwrap();

        let group = store.snapshot().await.unwrap();
        let mut own = 0;
        let changed = acquire_lease(&store, &ConsumerSettings::default(), &clock, &group, "consumer-a", "shard-0", &mut own)
            .await
            .unwrap();
        assert!(!changed);
    }
}
