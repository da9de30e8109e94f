use crate::{Client, Error, Result};
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, Record, ShardIteratorType};
use logstream_types::IteratorPosition;

/// A single record to submit via [`Client::put_records`].
#[derive(Debug, Clone)]
pub struct PutRecordsEntry {
    pub data: Vec<u8>,
    pub partition_key: String,
    pub explicit_hash_key: Option<String>,
}

/// Per-entry outcome of a [`Client::put_records`] call, positionally aligned with
/// the request so callers can tell which of their entries landed where.
#[derive(Debug, Clone)]
pub struct PutRecordsEntryResult {
    pub shard_id: String,
    pub sequence_number: String,
}

impl Client {
    /// `get-shard-iterator` (retried).
    pub async fn get_shard_iterator(&self, stream_name: &str, shard_id: &str, position: &IteratorPosition) -> Result<String> {
        let out = self
            .run("get_shard_iterator", self.retried_policy(), || {
                let mut req = self
                    .kinesis
                    .get_shard_iterator()
                    .stream_name(stream_name)
                    .shard_id(shard_id);
                req = match position {
                    IteratorPosition::AfterSequenceNumber(seq) => req
                        .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                        .starting_sequence_number(seq),
                    IteratorPosition::TrimHorizon => req.shard_iterator_type(ShardIteratorType::TrimHorizon),
                    IteratorPosition::Latest => req.shard_iterator_type(ShardIteratorType::Latest),
                };
                req.send()
            })
            .await?;

        out.shard_iterator.ok_or_else(|| Error::Provider {
            operation: "get_shard_iterator",
            code: None,
            message: "response carried no shard iterator".into(),
            backtrace: None,
        })
    }

    /// `get-records` (retried). Returns the raw vendor records together with the
    /// next iterator token (`None` once the shard is exhausted) and the reported
    /// lag, leaving decompression and de-aggregation to the codec layer.
    pub async fn get_records(
        &self,
        shard_iterator: &str,
        limit: i32,
    ) -> Result<(Vec<Record>, Option<String>, i64)> {
        let out = self
            .run("get_records", self.retried_policy(), || {
                self.kinesis
                    .get_records()
                    .shard_iterator(shard_iterator)
                    .limit(limit)
                    .send()
            })
            .await?;

        Ok((
            out.records,
            out.next_shard_iterator,
            out.millis_behind_latest.unwrap_or_default(),
        ))
    }

    /// `put-record` (retried).
    pub async fn put_record(
        &self,
        stream_name: &str,
        data: Vec<u8>,
        partition_key: &str,
    ) -> Result<PutRecordsEntryResult> {
        let out = self
            .run("put_record", self.retried_policy(), || {
                self.kinesis
                    .put_record()
                    .stream_name(stream_name)
                    .data(Blob::new(data.clone()))
                    .partition_key(partition_key)
                    .send()
            })
            .await?;

        Ok(PutRecordsEntryResult {
            shard_id: out.shard_id,
            sequence_number: out.sequence_number,
        })
    }

    /// `put-records` (retried). A batch response can partially succeed; per the
    /// source behaviour this re-submits only the failed entries and merges their
    /// results back into their original positions, still bounded by the overall
    /// retry budget rather than starting a fresh one per re-submission.
    pub async fn put_records(
        &self,
        stream_name: &str,
        entries: Vec<PutRecordsEntry>,
    ) -> Result<Vec<PutRecordsEntryResult>> {
        let mut results: Vec<Option<PutRecordsEntryResult>> = vec![None; entries.len()];
        let mut pending: Vec<usize> = (0..entries.len()).collect();
        let mut attempt: u32 = 0;

        while !pending.is_empty() {
            attempt += 1;
            let batch: Vec<PutRecordsRequestEntry> = pending
                .iter()
                .map(|&i| {
                    let entry = &entries[i];
                    let mut b = PutRecordsRequestEntry::builder()
                        .data(Blob::new(entry.data.clone()))
                        .partition_key(entry.partition_key.clone());
                    if let Some(hash_key) = &entry.explicit_hash_key {
                        b = b.explicit_hash_key(hash_key);
                    }
                    b.build().expect("partition_key and data are always set")
                })
                .collect();

            let send_result = self
                .run("put_records", self.retried_policy(), || {
                    self.kinesis
                        .put_records()
                        .stream_name(stream_name)
                        .set_records(Some(batch.clone()))
                        .send()
                })
                .await;

            let out = match send_result {
                Ok(out) => out,
                Err(err) => return Err(err),
            };

            let failed_count = out.failed_record_count.unwrap_or_default();
            let mut next_pending = Vec::new();

            for (slot, result_entry) in pending.iter().zip(out.records.into_iter()) {
                if result_entry.error_code.is_some() {
                    next_pending.push(*slot);
                } else {
                    results[*slot] = Some(PutRecordsEntryResult {
                        shard_id: result_entry.shard_id.unwrap_or_default(),
                        sequence_number: result_entry.sequence_number.unwrap_or_default(),
                    });
                }
            }

            if failed_count == 0 {
                break;
            }

            pending = next_pending;
            if !pending.is_empty() {
                match self.retried_policy().next_backoff(attempt) {
                    Some(delay) => {
                        tracing::warn!(stream_name, failed_count, attempt, "resubmitting partial put_records failure");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(Error::RetriesExhausted {
                            operation: "put_records",
                            attempts: attempt,
                            source: Box::new(Error::Provider {
                                operation: "put_records",
                                code: None,
                                message: format!("{failed_count} records still failing after exhausting retries"),
                                backtrace: None,
                            }),
                        })
                    }
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.expect("every entry is either satisfied or re-submitted"))
            .collect())
    }
}
