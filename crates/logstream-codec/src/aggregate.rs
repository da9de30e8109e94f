use crate::decode::RawRecord;
use crate::pb::AggregatedRecord;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use prost::Message;

const MAGIC: [u8; 4] = [0xF3, 0x89, 0x9A, 0xC2];
const CHECKSUM_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct DeaggregatedRecord {
    pub partition_key: String,
    pub explicit_hash_key: Option<String>,
    pub data: Vec<u8>,
    pub sequence_number: String,
    pub sub_sequence_number: u64,
    pub approximate_arrival_timestamp: Option<DateTime<Utc>>,
}

/// Splits a vendor record into its logical sub-records if it carries the
/// producer-side aggregation magic prefix; otherwise passes it through
/// unchanged as a single logical record with `sub_sequence_number` 0.
///
/// The trailing 16-byte checksum is not verified: a forged frame fails to
/// parse as a valid `AggregatedRecord` and is rejected by that, not by a
/// checksum mismatch.
pub fn deaggregate(record: &RawRecord) -> Result<Vec<DeaggregatedRecord>> {
    if record.data.len() < MAGIC.len() + CHECKSUM_LEN || record.data[..MAGIC.len()] != MAGIC {
        return Ok(vec![DeaggregatedRecord {
            partition_key: record.partition_key.clone(),
            explicit_hash_key: None,
            data: record.data.clone(),
            sequence_number: record.sequence_number.clone(),
            sub_sequence_number: 0,
            approximate_arrival_timestamp: record.approximate_arrival_timestamp,
        }]);
    }

    let body = &record.data[MAGIC.len()..record.data.len() - CHECKSUM_LEN];
    let aggregated = AggregatedRecord::decode(body).map_err(Error::MalformedAggregate)?;

    Ok(aggregated
        .records
        .into_iter()
        .enumerate()
        .map(|(i, inner)| DeaggregatedRecord {
            partition_key: aggregated
                .partition_key_table
                .get(inner.partition_key_index as usize)
                .cloned()
                .unwrap_or_else(|| record.partition_key.clone()),
            explicit_hash_key: inner
                .explicit_hash_key_index
                .and_then(|idx| aggregated.explicit_hash_key_table.get(idx as usize).cloned()),
            data: inner.data,
            sequence_number: record.sequence_number.clone(),
            sub_sequence_number: i as u64,
            approximate_arrival_timestamp: record.approximate_arrival_timestamp,
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pb::{AggregatedRecord, Record};

    fn raw(data: Vec<u8>) -> RawRecord {
        RawRecord {
            data,
            partition_key: "outer-pk".into(),
            sequence_number: "42".into(),
            approximate_arrival_timestamp: None,
            encryption_type: None,
        }
    }

    #[test]
    fn passes_through_records_without_the_magic_prefix() {
        let record = raw(b"plain record".to_vec());
        let out = deaggregate(&record).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"plain record");
        assert_eq!(out[0].sub_sequence_number, 0);
    }

    #[test]
    fn splits_an_aggregated_frame_into_logical_records() {
        let aggregated = AggregatedRecord {
            partition_key_table: vec!["pk-a".into(), "pk-b".into()],
            explicit_hash_key_table: vec![],
            records: vec![
                Record {
                    partition_key_index: 0,
                    explicit_hash_key_index: None,
                    data: b"one".to_vec(),
                    tags: vec![],
                },
                Record {
                    partition_key_index: 1,
                    explicit_hash_key_index: None,
                    data: b"two".to_vec(),
                    tags: vec![],
                },
            ],
        };
        let mut body = MAGIC.to_vec();
        body.extend(aggregated.encode_to_vec());
        body.extend([0u8; CHECKSUM_LEN]);

        let record = raw(body);
        let out = deaggregate(&record).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].partition_key, "pk-a");
        assert_eq!(out[0].data, b"one");
        assert_eq!(out[1].partition_key, "pk-b");
        assert_eq!(out[1].sub_sequence_number, 1);
    }

    /// Invariant: an aggregated frame of `k` inner records de-bundles into
    /// exactly `k` logical records, numbered `0..k`, all sharing the outer
    /// sequence number.
    #[quickcheck_macros::quickcheck]
    fn debundles_into_exactly_k_logical_records(inner_count: u8) -> bool {
        let inner_count = (inner_count % 32) as usize;
        let aggregated = AggregatedRecord {
            partition_key_table: vec!["pk".into()],
            explicit_hash_key_table: vec![],
            records: (0..inner_count)
                .map(|i| Record {
                    partition_key_index: 0,
                    explicit_hash_key_index: None,
                    data: format!("record-{i}").into_bytes(),
                    tags: vec![],
                })
                .collect(),
        };
        let mut body = MAGIC.to_vec();
        body.extend(aggregated.encode_to_vec());
        body.extend([0u8; CHECKSUM_LEN]);

        let out = deaggregate(&raw(body)).unwrap();

        out.len() == inner_count
            && out.iter().enumerate().all(|(i, r)| r.sub_sequence_number == i as u64 && r.sequence_number == "42")
    }
}
