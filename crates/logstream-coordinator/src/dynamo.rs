use crate::{CoordinatorStore, Error, LockOutcome, ReleaseOutcome, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
    SseSpecification, SseType, Tag,
};
use chrono::Utc;
use logstream_types::{new_version, ConsumerGroupState, ConsumerMetadata, EnhancedConsumerState, OwnedShard, ShardDescriptor, ShardState, Version};
use std::time::Duration;

const MAX_CAS_ATTEMPTS: u32 = 5;

/// DynamoDB-backed [`CoordinatorStore`]: one item per `(group, logName)`, holding
/// the whole [`ConsumerGroupState`] document as a JSON blob plus a mirrored
/// `version` attribute used for the item's condition expressions.
pub struct DynamoCoordinatorStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    group: String,
    log_name: String,
}

impl DynamoCoordinatorStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>, group: impl Into<String>, log_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            group: group.into(),
            log_name: log_name.into(),
        }
    }

    /// First-use flow: describe the table; if absent, create it with the
    /// `(group, logName)` hash/range schema and server-side encryption, then
    /// wait for it to go active and ensure the expected tags are present.
    pub async fn ensure_table(&self) -> Result<()> {
        match self.client.describe_table().table_name(&self.table_name).send().await {
            Ok(_) => return self.wait_for_active().await,
            Err(err) if err.code() == Some("ResourceNotFoundException") => {}
            Err(err) => return Err(self.to_error("describe_table", &err)),
        }

        let result = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("group")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .expect("static schema is valid"),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("log_name")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .expect("static schema is valid"),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("group")
                    .key_type(KeyType::Hash)
                    .build()
                    .expect("static schema is valid"),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("log_name")
                    .key_type(KeyType::Range)
                    .build()
                    .expect("static schema is valid"),
            )
            .billing_mode(BillingMode::PayPerRequest)
            .sse_specification(SseSpecification::builder().enabled(true).sse_type(SseType::Kms).build())
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(err) if err.code() == Some("ResourceInUseException") => {
                tracing::debug!(table = %self.table_name, "coordinator table already exists");
            }
            Err(err) => return Err(self.to_error("create_table", &err)),
        }

        self.wait_for_active().await?;
        self.ensure_tags().await
    }

    async fn wait_for_active(&self) -> Result<()> {
        loop {
            let desc = self
                .client
                .describe_table()
                .table_name(&self.table_name)
                .send()
                .await
                .map_err(|err| self.to_error("describe_table", &err))?;

            let status = desc.table.and_then(|t| t.table_status);
            if status == Some(aws_sdk_dynamodb::types::TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn ensure_tags(&self) -> Result<()> {
        let desc = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|err| self.to_error("describe_table", &err))?;
        let Some(arn) = desc.table.and_then(|t| t.table_arn) else {
            return Ok(());
        };

        self.client
            .tag_resource()
            .resource_arn(arn)
            .tags(Tag::builder().key("component").value("logstream-coordinator").build().expect("static tag is valid"))
            .send()
            .await
            .map_err(|err| self.to_error("tag_resource", &err))?;
        Ok(())
    }

    fn key(&self) -> std::collections::HashMap<String, AttributeValue> {
        std::collections::HashMap::from([
            ("group".to_owned(), AttributeValue::S(self.group.clone())),
            ("log_name".to_owned(), AttributeValue::S(self.log_name.clone())),
        ])
    }

    async fn load(&self) -> Result<Option<ConsumerGroupState>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| self.to_error("get_item", &err))?;

        let Some(item) = out.item else { return Ok(None) };
        let Some(AttributeValue::S(document)) = item.get("document") else {
            return Ok(None);
        };
        let state: ConsumerGroupState = serde_json::from_str(document).map_err(|source| Error::Corrupt {
            group: self.group.clone(),
            log_name: self.log_name.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    /// Writes `state` (whose `version` field has already been bumped), conditioned
    /// on the document either not existing (`expected_version: None`) or its
    /// current version matching `expected_version`. Returns `Ok(false)` on a
    /// condition failure, never an error for that case.
    async fn save(&self, state: &ConsumerGroupState, expected_version: Option<&str>) -> Result<bool> {
        let document = serde_json::to_string(state).map_err(|source| Error::Corrupt {
            group: self.group.clone(),
            log_name: self.log_name.clone(),
            source,
        })?;

        let mut item = self.key();
        item.insert("document".to_owned(), AttributeValue::S(document));
        item.insert("version".to_owned(), AttributeValue::S(state.version.clone()));

        let mut request = self.client.put_item().table_name(&self.table_name).set_item(Some(item));
        request = match expected_version {
            Some(expected) => request
                .condition_expression("version = :expected")
                .expression_attribute_values(":expected", AttributeValue::S(expected.to_owned())),
            None => request.condition_expression("attribute_not_exists(#grp)").expression_attribute_names("#grp", "group"),
        };

        match request.send().await {
            Ok(_) => Ok(true),
            Err(err) if err.code() == Some("ConditionalCheckFailedException") => Ok(false),
            Err(err) => Err(self.to_error("put_item", &err)),
        }
    }

    /// Reads the document, applies `mutate`, and writes it back conditioned on
    /// the version observed at read time, retrying on a lost race. Used for
    /// operations whose outcome type has no room for a `Conflict` variant.
    async fn update_with_retry<R>(&self, mut mutate: impl FnMut(&mut ConsumerGroupState) -> R) -> Result<R> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut state = self.load().await?.unwrap_or_default();
            let observed_version = if state.version.is_empty() { None } else { Some(state.version.clone()) };
            let result = mutate(&mut state);
            state.version = new_version();

            if self.save(&state, observed_version.as_deref()).await? {
                return Ok(result);
            }
        }
        Err(Error::Provider {
            operation: "update_with_retry",
            code: None,
            message: format!("lost the compare-and-swap race {MAX_CAS_ATTEMPTS} times in a row"),
        })
    }

    fn to_error<E: ProvideErrorMetadata>(&self, operation: &'static str, err: &E) -> Error {
        Error::Provider {
            operation,
            code: err.code().map(str::to_owned),
            message: err.message().unwrap_or_default().to_owned(),
        }
    }
}

#[async_trait]
impl CoordinatorStore for DynamoCoordinatorStore {
    async fn init_state(&self) -> Result<()> {
        if self.load().await?.is_some() {
            return Ok(());
        }
        let mut state = ConsumerGroupState::default();
        state.version = new_version();
        // A racing initializer is fine; either write wins and both observe a state.
        self.save(&state, None).await?;
        Ok(())
    }

    async fn register_consumer(&self, consumer_id: &str, metadata: ConsumerMetadata) -> Result<()> {
        self.update_with_retry(|state| {
            state.consumers.insert(consumer_id.to_owned(), metadata.clone());
        })
        .await
    }

    async fn clear_old_consumers(&self, threshold: Duration) -> Result<()> {
        let cutoff = Utc::now() - chrono::Duration::from_std(threshold).unwrap_or_default();
        self.update_with_retry(|state| {
            state.consumers.retain(|_, meta| meta.heartbeat >= cutoff);
        })
        .await
    }

    async fn get_shard_and_stream_state(&self, shard_id: &str, descriptor: &ShardDescriptor) -> Result<ShardState> {
        self.update_with_retry(|state| {
            state
                .shards
                .entry(shard_id.to_owned())
                .or_insert_with(|| ShardState::new_default(descriptor))
                .clone()
        })
        .await
    }

    async fn lock_shard_lease(
        &self,
        shard_id: &str,
        owner: &str,
        term: Duration,
        expected_version: &Version,
    ) -> Result<LockOutcome> {
        let Some(mut state) = self.load().await? else {
            return Ok(LockOutcome::Conflict);
        };
        let Some(shard) = state.shards.get_mut(shard_id) else {
            return Ok(LockOutcome::Conflict);
        };
        if &shard.version != expected_version {
            return Ok(LockOutcome::Conflict);
        }

        let document_version = state.version.clone();
        shard.lease_owner = Some(owner.to_owned());
        shard.lease_expiration = Some(Utc::now() + chrono::Duration::from_std(term).unwrap_or_default());
        let new_shard_version = new_version();
        shard.version = new_shard_version.clone();
        state.version = new_version();

        if self.save(&state, Some(&document_version)).await? {
            Ok(LockOutcome::Acquired(new_shard_version))
        } else {
            Ok(LockOutcome::Conflict)
        }
    }

    async fn release_shard_lease(&self, shard_id: &str, expected_version: &Version) -> Result<ReleaseOutcome> {
        let Some(mut state) = self.load().await? else {
            return Ok(ReleaseOutcome::Conflict);
        };
        let Some(shard) = state.shards.get_mut(shard_id) else {
            return Ok(ReleaseOutcome::Conflict);
        };
        if &shard.version != expected_version {
            return Ok(ReleaseOutcome::Conflict);
        }

        let document_version = state.version.clone();
        shard.lease_owner = None;
        shard.lease_expiration = None;
        let new_shard_version = new_version();
        shard.version = new_shard_version.clone();
        state.version = new_version();

        if self.save(&state, Some(&document_version)).await? {
            Ok(ReleaseOutcome::Released(new_shard_version))
        } else {
            Ok(ReleaseOutcome::Conflict)
        }
    }

    async fn store_shard_checkpoint(&self, shard_id: &str, sequence_number: &str) -> Result<()> {
        self.update_with_retry(|state| {
            if let Some(shard) = state.shards.get_mut(shard_id) {
                shard.checkpoint = Some(sequence_number.to_owned());
            }
        })
        .await
    }

    async fn mark_shard_as_depleted(&self, shard_id: &str, children: &[ShardDescriptor]) -> Result<()> {
        self.update_with_retry(|state| {
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
        })
        .await
    }

    async fn get_owned_shards(&self, consumer_id: &str) -> Result<Vec<OwnedShard>> {
        let state = self.load().await?.unwrap_or_default();
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
        self.update_with_retry(|state| {
            state.enhanced_consumers.insert(
                name.to_owned(),
                EnhancedConsumerState {
                    arn: arn.to_owned(),
                    is_used_by: None,
                    version: new_version(),
                },
            );
        })
        .await
    }

    async fn deregister_enhanced_consumer(&self, name: &str) -> Result<()> {
        self.update_with_retry(|state| {
            state.enhanced_consumers.remove(name);
        })
        .await
    }

    async fn lock_stream_consumer(&self, name: &str, owner: &str, expected_version: &Version) -> Result<LockOutcome> {
        let Some(mut state) = self.load().await? else {
            return Ok(LockOutcome::Conflict);
        };
        let Some(consumer) = state.enhanced_consumers.get_mut(name) else {
            return Ok(LockOutcome::Conflict);
        };
        if &consumer.version != expected_version {
            return Ok(LockOutcome::Conflict);
        }

        let document_version = state.version.clone();
        consumer.is_used_by = Some(owner.to_owned());
        let new_consumer_version = new_version();
        consumer.version = new_consumer_version.clone();
        state.version = new_version();

        if self.save(&state, Some(&document_version)).await? {
            Ok(LockOutcome::Acquired(new_consumer_version))
        } else {
            Ok(LockOutcome::Conflict)
        }
    }

    async fn get_assigned_enhanced_consumer(&self, consumer_id: &str) -> Result<Option<String>> {
        let state = self.load().await?.unwrap_or_default();
        Ok(state
            .enhanced_consumers
            .iter()
            .find(|(_, c)| c.is_used_by.as_deref() == Some(consumer_id))
            .map(|(name, _)| name.clone()))
    }

    async fn snapshot(&self) -> Result<ConsumerGroupState> {
        Ok(self.load().await?.unwrap_or_default())
    }
}
