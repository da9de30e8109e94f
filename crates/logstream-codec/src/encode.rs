use crate::blob::{offload_key, BlobStore, S3ItemRef, S3ItemSentinel};
use crate::compression;
use crate::config::CodecConfig;
use crate::{Error, Result};
use sha1::{Digest, Sha1};

/// The payload of a record to be submitted, prior to encoding. `Json` values
/// that aren't already string/byte-shaped are the Rust analogue of "data that
/// isn't a string or byte sequence" in the source's dynamically-typed input.
#[derive(Debug, Clone)]
pub enum RecordPayload {
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Default)]
pub struct EncodeRequest {
    pub data: Option<RecordPayload>,
    pub partition_key: Option<String>,
    pub explicit_hash_key: Option<String>,
    pub sequence_number_for_ordering: Option<String>,
}

/// A record shaped for submission to the log vendor's put-record(s) call.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    pub data: Vec<u8>,
    pub partition_key: String,
    pub explicit_hash_key: Option<String>,
    pub sequence_number_for_ordering: Option<String>,
}

/// Encodes one record: JSON-serializes non-byte payloads, compresses if
/// configured, offloads to the blob store past `large_item_threshold_bytes`,
/// and derives a partition key from the final body when the caller didn't
/// supply one.
pub async fn encode(config: &CodecConfig, blobs: Option<&dyn BlobStore>, log_name: &str, request: EncodeRequest) -> Result<EncodedRecord> {
    let payload = request.data.ok_or(Error::MissingField("data"))?;

    let (body, original_object) = match payload {
        RecordPayload::Bytes(bytes) => (bytes, None),
        RecordPayload::Json(value) => {
            let object = value.as_object().cloned();
            (serde_json::to_vec(&value).expect("serde_json::Value always serializes"), object)
        }
    };

    let compressed = compression::compress(config.compression, &body).await?;

    let final_body = if config.use_s3_for_large_items && compressed.len() >= config.large_item_threshold_bytes {
        match blobs {
            Some(blobs) => {
                let reference = blobs.put(&offload_key(log_name), compressed).await?;
                build_sentinel_body(reference, original_object, &config.non_s3_keys)
            }
            None => {
                tracing::warn!(log_name, "use_s3_for_large_items is set but no blob store was configured; submitting inline");
                compressed
            }
        }
    } else {
        compressed
    };

    let partition_key = match request.partition_key {
        Some(key) => key,
        None => derive_partition_key(&final_body),
    };

    Ok(EncodedRecord {
        data: final_body,
        partition_key,
        explicit_hash_key: request.explicit_hash_key,
        sequence_number_for_ordering: request.sequence_number_for_ordering,
    })
}

fn build_sentinel_body(reference: S3ItemRef, original_object: Option<serde_json::Map<String, serde_json::Value>>, non_s3_keys: &[String]) -> Vec<u8> {
    let sentinel = S3ItemSentinel { item: reference };
    let mut value = serde_json::to_value(sentinel).expect("sentinel always serializes");

    if let (Some(object), Some(map)) = (original_object, value.as_object_mut()) {
        for key in non_s3_keys {
            if let Some(retained) = object.get(key) {
                map.insert(key.clone(), retained.clone());
            }
        }
    }

    serde_json::to_vec(&value).expect("serde_json::Value always serializes")
}

fn derive_partition_key(body: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body);
    base64::encode(hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn missing_data_is_an_error() {
        let config = CodecConfig::default();
        let err = encode(&config, None, "my-log", EncodeRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::MissingField("data")));
    }

    #[tokio::test]
    async fn derives_partition_key_when_absent() {
        let config = CodecConfig::default();
        let request = EncodeRequest {
            data: Some(RecordPayload::Bytes(b"hello".to_vec())),
            ..Default::default()
        };
        let record = encode(&config, None, "my-log", request).await.unwrap();
        assert!(!record.partition_key.is_empty());
        assert_eq!(record.data, b"hello");
    }

    #[tokio::test]
    async fn json_payload_is_serialized() {
        let config = CodecConfig::default();
        let request = EncodeRequest {
            data: Some(RecordPayload::Json(serde_json::json!({"a": 1}))),
            ..Default::default()
        };
        let record = encode(&config, None, "my-log", request).await.unwrap();
        assert_eq!(record.data, br#"{"a":1}"#);
    }
}
