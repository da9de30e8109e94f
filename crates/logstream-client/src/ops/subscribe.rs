use crate::{Client, Result};
use aws_sdk_kinesis::operation::subscribe_to_shard::SubscribeToShardOutput;
use aws_sdk_kinesis::types::StartingPosition;
use logstream_types::IteratorPosition;

impl Client {
    /// `subscribe-to-shard` (non-retried): opens one enhanced fan-out event stream.
    ///
    /// The subscription itself is short-lived from the vendor's perspective (it
    /// expires after a few minutes, or drops on transport failure); reconnecting
    /// with backoff once the returned event stream ends is the push reader's job,
    /// not this wrapper's.
    pub async fn subscribe_to_shard(
        &self,
        consumer_arn: &str,
        shard_id: &str,
        position: &IteratorPosition,
    ) -> Result<SubscribeToShardOutput> {
        let starting_position = match position {
            IteratorPosition::AfterSequenceNumber(seq) => StartingPosition::builder()
                .r#type(aws_sdk_kinesis::types::ShardIteratorType::AfterSequenceNumber)
                .sequence_number(seq)
                .build()
                .expect("type is always set"),
            IteratorPosition::TrimHorizon => StartingPosition::builder()
                .r#type(aws_sdk_kinesis::types::ShardIteratorType::TrimHorizon)
                .build()
                .expect("type is always set"),
            IteratorPosition::Latest => StartingPosition::builder()
                .r#type(aws_sdk_kinesis::types::ShardIteratorType::Latest)
                .build()
                .expect("type is always set"),
        };

        self.run("subscribe_to_shard", self.non_retried_policy(), || {
            self.kinesis
                .subscribe_to_shard()
                .consumer_arn(consumer_arn)
                .shard_id(shard_id)
                .starting_position(starting_position.clone())
                .send()
        })
        .await
    }
}
