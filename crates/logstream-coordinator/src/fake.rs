use crate::{CoordinatorStore, LockOutcome, ReleaseOutcome, Result};
use async_trait::async_trait;
use chrono::Utc;
use logstream_types::{new_version, ConsumerGroupState, ConsumerMetadata, EnhancedConsumerState, OwnedShard, ShardDescriptor, ShardState, Version};
use std::sync::Mutex;

/// In-memory [`CoordinatorStore`], mirroring the conditional-update semantics of
/// the real store without any backing table. Used by lease-coordinator and
/// reconciler tests that need a store but not a network.
#[derive(Default)]
pub struct FakeCoordinatorStore {
    state: Mutex<ConsumerGroupState>,
}

impl FakeCoordinatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access for test setup/assertions that don't go through the trait.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ConsumerGroupState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl CoordinatorStore for FakeCoordinatorStore {
    async fn init_state(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.version.is_empty() {
            state.version = new_version();
        }
        Ok(())
    }

    async fn register_consumer(&self, consumer_id: &str, metadata: ConsumerMetadata) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.consumers.insert(consumer_id.to_owned(), metadata);
        state.version = new_version();
        Ok(())
    }

    async fn clear_old_consumers(&self, threshold: std::time::Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::from_std(threshold).unwrap_or_default();
        let before = state.consumers.len();
        state.consumers.retain(|_, meta| meta.heartbeat >= cutoff);
        if state.consumers.len() != before {
            state.version = new_version();
        }
        Ok(())
    }

    async fn get_shard_and_stream_state(&self, shard_id: &str, descriptor: &ShardDescriptor) -> Result<ShardState> {
        let mut state = self.state.lock().unwrap();
        if !state.shards.contains_key(shard_id) {
            state.shards.insert(shard_id.to_owned(), ShardState::new_default(descriptor));
        }
        Ok(state.shards[shard_id].clone())
    }

    async fn lock_shard_lease(
        &self,
        shard_id: &str,
        owner: &str,
        term: std::time::Duration,
        expected_version: &Version,
    ) -> Result<LockOutcome> {
        let mut state = self.state.lock().unwrap();
        let Some(shard) = state.shards.get_mut(shard_id) else {
            return Ok(LockOutcome::Conflict);
        };
        if &shard.version != expected_version {
            return Ok(LockOutcome::Conflict);
        }
        shard.lease_owner = Some(owner.to_owned());
        shard.lease_expiration = Some(Utc::now() + chrono::Duration::from_std(term).unwrap_or_default());
        shard.version = new_version();
        Ok(LockOutcome::Acquired(shard.version.clone()))
    }

    async fn release_shard_lease(&self, shard_id: &str, expected_version: &Version) -> Result<ReleaseOutcome> {
        let mut state = self.state.lock().unwrap();
        let Some(shard) = state.shards.get_mut(shard_id) else {
            return Ok(ReleaseOutcome::Conflict);
        };
        if &shard.version != expected_version {
            return Ok(ReleaseOutcome::Conflict);
        }
        shard.lease_owner = None;
        shard.lease_expiration = None;
        shard.version = new_version();
        Ok(ReleaseOutcome::Released(shard.version.clone()))
    }

    async fn store_shard_checkpoint(&self, shard_id: &str, sequence_number: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(shard) = state.shards.get_mut(shard_id) {
            shard.checkpoint = Some(sequence_number.to_owned());
        }
        Ok(())
    }

    async fn mark_shard_as_depleted(&self, shard_id: &str, children: &[ShardDescriptor]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(shard) = state.shards.get_mut(shard_id) {
            shard.depleted = true;
            shard.version = new_version();
        }
        for child in children {
            state
                .shards
                .entry(child.shard_id.clone())
                .or_insert_with(|| ShardState::new_default(child));
        }
        Ok(())
    }

    async fn get_owned_shards(&self, consumer_id: &str) -> Result<Vec<OwnedShard>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .shards
            .iter()
            .filter(|(_, s)| s.lease_owner.as_deref() == Some(consumer_id))
            .map(|(shard_id, s)| OwnedShard {
                shard_id: shard_id.clone(),
                checkpoint: s.checkpoint.clone(),
                lease_expiration: s.lease_expiration,
                has_children: state.shards.values().any(|other| other.parent.contains(shard_id)),
            })
            .collect())
    }

    async fn register_enhanced_consumer(&self, name: &str, arn: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.enhanced_consumers.insert(
            name.to_owned(),
            EnhancedConsumerState {
                arn: arn.to_owned(),
                is_used_by: None,
                version: new_version(),
            },
        );
        Ok(())
    }

    async fn deregister_enhanced_consumer(&self, name: &str) -> Result<()> {
        self.state.lock().unwrap().enhanced_consumers.remove(name);
        Ok(())
    }

    async fn lock_stream_consumer(&self, name: &str, owner: &str, expected_version: &Version) -> Result<LockOutcome> {
        let mut state = self.state.lock().unwrap();
        let Some(consumer) = state.enhanced_consumers.get_mut(name) else {
            return Ok(LockOutcome::Conflict);
        };
        if &consumer.version != expected_version {
            return Ok(LockOutcome::Conflict);
        }
        consumer.is_used_by = Some(owner.to_owned());
        consumer.version = new_version();
        Ok(LockOutcome::Acquired(consumer.version.clone()))
    }

    async fn get_assigned_enhanced_consumer(&self, consumer_id: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .enhanced_consumers
            .iter()
            .find(|(_, c)| c.is_used_by.as_deref() == Some(consumer_id))
            .map(|(name, _)| name.clone()))
    }

    async fn snapshot(&self) -> Result<ConsumerGroupState> {
        Ok(self.state.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn lock_shard_lease_rejects_stale_version() {
        let store = FakeCoordinatorStore::new();
        let descriptor = ShardDescriptor {
            shard_id: "shard-0".into(),
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
            starting_sequence_number: "0".into(),
            is_closed: false,
        };
        let state = store.get_shard_and_stream_state("shard-0", &descriptor).await.unwrap();

        let outcome = store
            .lock_shard_lease("shard-0", "consumer-a", std::time::Duration::from_secs(300), &state.version)
            .await
            .unwrap();
        assert!(matches!(outcome, LockOutcome::Acquired(_)));

        let stale = store
            .lock_shard_lease("shard-0", "consumer-b", std::time::Duration::from_secs(300), &state.version)
            .await
            .unwrap();
        assert_eq!(stale, LockOutcome::Conflict);
    }

    #[tokio::test]
    async fn get_owned_shards_reports_children() {
        let store = FakeCoordinatorStore::new();
        let parent = ShardDescriptor {
            shard_id: "shard-0".into(),
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
            starting_sequence_number: "0".into(),
            is_closed: true,
        };
        let child = ShardDescriptor {
            shard_id: "shard-1".into(),
            parent_shard_id: Some("shard-0".into()),
            adjacent_parent_shard_id: None,
            starting_sequence_number: "100".into(),
            is_closed: false,
        };
        let state = store.get_shard_and_stream_state("shard-0", &parent).await.unwrap();
        store
            .lock_shard_lease("shard-0", "consumer-a", std::time::Duration::from_secs(300), &state.version)
            .await
            .unwrap();
        store.get_shard_and_stream_state("shard-1", &child).await.unwrap();

        let owned = store.get_owned_shards("consumer-a").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(owned[0].has_children);
    }

    /// Invariant: of any number of consumers racing to lock the same shard
    /// against the same observed version, exactly one succeeds.
    #[tokio::test]
    async fn exactly_one_racing_lock_attempt_succeeds() {
        use std::sync::Arc;

        let store = Arc::new(FakeCoordinatorStore::new());
        let descriptor = ShardDescriptor {
            shard_id: "shard-0".into(),
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
            starting_sequence_number: "0".into(),
            is_closed: false,
        };
        let observed = store.get_shard_and_stream_state("shard-0", &descriptor).await.unwrap().version;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let observed = observed.clone();
                tokio::spawn(async move {
                    store
                        .lock_shard_lease(
                            "shard-0",
                            &format!("consumer-{i}"),
                            std::time::Duration::from_secs(300),
                            &observed,
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let acquired = outcomes.iter().filter(|o| matches!(o, LockOutcome::Acquired(_))).count();
        assert_eq!(acquired, 1, "exactly one racing lock attempt must win: {outcomes:?}");
    }
}
