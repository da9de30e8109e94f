use crate::Result;
use async_trait::async_trait;
use logstream_types::{ConsumerMetadata, OwnedShard, ShardDescriptor, ShardState, Version};
use std::time::Duration;

/// Outcome of a conditional lock attempt: either it succeeded, yielding the
/// document's new version, or a peer won the race and the caller should
/// re-evaluate on its next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(Version),
    Conflict,
}

/// Outcome of a conditional release. Mirrors [`LockOutcome`]; kept distinct so
/// call sites read as "releasing", not "locking".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(Version),
    Conflict,
}

/// Persistent, consistent state for one `(group, logName)` consumer group,
/// backed by a transactional key-value store with conditional mutations keyed
/// on an opaque `version` token. A version conflict is never an error: it
/// signals the caller to re-read and retry its decision on the next tick.
#[async_trait]
pub trait CoordinatorStore: Send + Sync {
    /// Inserts the empty document if none exists yet. Idempotent.
    async fn init_state(&self) -> Result<()>;

    /// Upserts the consumer's sub-record and always bumps its `heartbeat`.
    async fn register_consumer(&self, consumer_id: &str, metadata: ConsumerMetadata) -> Result<()>;

    /// Removes consumer entries whose `heartbeat` is older than `threshold`,
    /// bumping the document's `version` iff anything was removed.
    async fn clear_old_consumers(&self, threshold: Duration) -> Result<()>;

    /// Reads the current state of `shard_id`, inserting a default derived from
    /// `descriptor` if the shard has not been observed before.
    async fn get_shard_and_stream_state(&self, shard_id: &str, descriptor: &ShardDescriptor) -> Result<ShardState>;

    /// Sets `lease_owner = owner`, `lease_expiration = now + term`, conditioned
    /// on the shard's current version matching `expected_version`.
    async fn lock_shard_lease(
        &self,
        shard_id: &str,
        owner: &str,
        term: Duration,
        expected_version: &Version,
    ) -> Result<LockOutcome>;

    /// Clears `lease_owner`/`lease_expiration`, conditioned on a version match.
    async fn release_shard_lease(&self, shard_id: &str, expected_version: &Version) -> Result<ReleaseOutcome>;

    /// Updates the checkpoint unconditionally; the sequence-number space is
    /// monotonic by construction so no version check is needed.
    async fn store_shard_checkpoint(&self, shard_id: &str, sequence_number: &str) -> Result<()>;

    /// Marks `shard_id` depleted and records `children` as its descendants, so
    /// a later `get_shard_and_stream_state` for them inherits the parent link.
    async fn mark_shard_as_depleted(&self, shard_id: &str, children: &[ShardDescriptor]) -> Result<()>;

    /// Shards currently leased by `consumer_id`.
    async fn get_owned_shards(&self, consumer_id: &str) -> Result<Vec<OwnedShard>>;

    /// Registers an enhanced fan-out consumer ARN under `name`.
    async fn register_enhanced_consumer(&self, name: &str, arn: &str) -> Result<()>;

    async fn deregister_enhanced_consumer(&self, name: &str) -> Result<()>;

    /// Assigns the enhanced consumer `name` to `owner`, conditioned on version.
    async fn lock_stream_consumer(&self, name: &str, owner: &str, expected_version: &Version) -> Result<LockOutcome>;

    /// The enhanced consumer name currently assigned to `consumer_id`, if any.
    async fn get_assigned_enhanced_consumer(&self, consumer_id: &str) -> Result<Option<String>>;

    /// A read-only snapshot of the whole group document, used by the lease
    /// coordinator to evaluate `own`, `maxActive`, and orphan checks.
    async fn snapshot(&self) -> Result<logstream_types::ConsumerGroupState>;
}
