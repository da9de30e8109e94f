//! Entities shared across the log client, coordinator store, and consumer-group
//! distribution layer: shards, consumer-group documents, and the injectable clock.

mod clock;
pub use clock::{Clock, FakeClock, SystemClock};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub type ShardId = String;
pub type ConsumerId = String;
pub type SequenceNumber = String;

/// Opaque optimistic-concurrency token. A fresh one is generated on every mutation
/// of the consumer-group document; conditional updates match on the prior value.
pub type Version = String;

pub fn new_version() -> Version {
    uuid::Uuid::new_v4().to_string()
}

/// A shard as described by the log service's shard listing, independent of any
/// consumer-group bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShardDescriptor {
    pub shard_id: ShardId,
    pub parent_shard_id: Option<ShardId>,
    pub adjacent_parent_shard_id: Option<ShardId>,
    pub starting_sequence_number: SequenceNumber,
    /// Set once the log reports the shard as closed (its ending sequence number is set).
    pub is_closed: bool,
}

/// Per-consumer liveness and identity, refreshed on every heartbeat tick.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumerMetadata {
    pub app_name: String,
    pub host: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub heartbeat: DateTime<Utc>,
    pub is_active: bool,
    pub is_standalone: bool,
}

/// Coordinator-store bookkeeping for a single shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShardState {
    /// Zero, one, or two parents. A dangling parent id (absent from the log's
    /// current shard listing) is treated as though there were no parent.
    #[serde(default)]
    pub parent: Vec<ShardId>,
    pub starting_sequence_number: Option<SequenceNumber>,
    pub checkpoint: Option<SequenceNumber>,
    pub lease_owner: Option<ConsumerId>,
    pub lease_expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depleted: bool,
    #[serde(default)]
    pub version: Version,
}

impl ShardState {
    pub fn new_default(descriptor: &ShardDescriptor) -> Self {
        Self {
            parent: descriptor
                .parent_shard_id
                .iter()
                .chain(descriptor.adjacent_parent_shard_id.iter())
                .cloned()
                .collect(),
            starting_sequence_number: Some(descriptor.starting_sequence_number.clone()),
            checkpoint: None,
            lease_owner: None,
            lease_expiration: None,
            depleted: false,
            version: new_version(),
        }
    }
}

/// An enhanced (push) delivery endpoint registered against the log, and the
/// consumer currently assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnhancedConsumerState {
    pub arn: String,
    pub is_used_by: Option<ConsumerId>,
    #[serde(default)]
    pub version: Version,
}

/// The single document persisted per `(group, logName)` in the coordinator store.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumerGroupState {
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub consumers: BTreeMap<ConsumerId, ConsumerMetadata>,
    #[serde(default)]
    pub shards: BTreeMap<ShardId, ShardState>,
    #[serde(default)]
    pub enhanced_consumers: BTreeMap<String, EnhancedConsumerState>,
}

impl ConsumerGroupState {
    /// Number of shards leased by `consumer` that are not yet depleted.
    pub fn active_lease_count(&self, consumer: &str) -> usize {
        self.shards
            .values()
            .filter(|s| !s.depleted && s.lease_owner.as_deref() == Some(consumer))
            .count()
    }

    /// Count of non-depleted shards across the whole group.
    pub fn non_depleted_shard_count(&self) -> usize {
        self.shards.values().filter(|s| !s.depleted).count()
    }

    /// Count of consumers eligible to receive leases under the round-robin policy:
    /// active and not in standalone mode.
    pub fn active_non_standalone_consumer_count(&self) -> usize {
        self.consumers
            .values()
            .filter(|c| c.is_active && !c.is_standalone)
            .count()
    }
}

/// Where a pull reader should position its iterator, mirroring the vendor's
/// `ShardIteratorType` but independent of any particular SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorPosition {
    /// Read starting just after the given sequence number (resuming from a checkpoint).
    AfterSequenceNumber(SequenceNumber),
    /// Read starting from the oldest retained record.
    TrimHorizon,
    /// Read only newly-arriving records.
    Latest,
}

/// A shard currently leased by this consumer, as returned by `getOwnedShards`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedShard {
    pub shard_id: ShardId,
    pub checkpoint: Option<SequenceNumber>,
    pub lease_expiration: Option<DateTime<Utc>>,
    pub has_children: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shard_state_inherits_parents_from_descriptor() {
        let descriptor = ShardDescriptor {
            shard_id: "shardId-0001".into(),
            parent_shard_id: Some("shardId-0000".into()),
            adjacent_parent_shard_id: None,
            starting_sequence_number: "100".into(),
            is_closed: false,
        };
        let state = ShardState::new_default(&descriptor);
        assert_eq!(state.parent, vec!["shardId-0000".to_string()]);
        assert!(!state.depleted);
        assert!(state.lease_owner.is_none());
    }

    #[test]
    fn active_lease_count_ignores_depleted_shards() {
        let mut group = ConsumerGroupState::default();
        group.shards.insert(
            "shard-0".into(),
            ShardState {
                lease_owner: Some("c1".into()),
                depleted: false,
                ..Default::default()
            },
        );
        group.shards.insert(
            "shard-1".into(),
            ShardState {
                lease_owner: Some("c1".into()),
                depleted: true,
                ..Default::default()
            },
        );
        assert_eq!(group.active_lease_count("c1"), 1);
    }
}
