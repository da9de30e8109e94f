use crate::{Client, Result};
use logstream_types::ShardDescriptor;

impl Client {
    /// `list-shards` (retried). Pages through the full shard listing, following
    /// `next_token` until exhausted.
    pub async fn list_shards(&self, stream_name: &str) -> Result<Vec<ShardDescriptor>> {
        let mut shards = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let out = self
                .run("list_shards", self.retried_policy(), || {
                    let mut req = self.kinesis.list_shards();
                    req = match &next_token {
                        Some(token) => req.next_token(token),
                        None => req.stream_name(stream_name),
                    };
                    req.send()
                })
                .await?;

            for shard in out.shards.unwrap_or_default() {
                let range = shard.sequence_number_range();
                shards.push(ShardDescriptor {
                    shard_id: shard.shard_id().to_owned(),
                    parent_shard_id: shard.parent_shard_id().map(str::to_owned),
                    adjacent_parent_shard_id: shard.adjacent_parent_shard_id().map(str::to_owned),
                    starting_sequence_number: range
                        .map(|r| r.starting_sequence_number().to_owned())
                        .unwrap_or_default(),
                    is_closed: range.and_then(|r| r.ending_sequence_number()).is_some(),
                });
            }

            next_token = out.next_token;
            if next_token.is_none() {
                break;
            }
        }

        Ok(shards)
    }
}
