use crate::blob::{BlobStore, S3ItemSentinel};
use crate::compression;
use crate::config::{CodecConfig, JsonParseMode, OutputEncoding};
use crate::Result;
use chrono::{DateTime, Utc};

/// A record as handed back by the log vendor, independent of any particular
/// SDK's generated types.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub data: Vec<u8>,
    pub partition_key: String,
    pub sequence_number: String,
    pub approximate_arrival_timestamp: Option<DateTime<Utc>>,
    pub encryption_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub approximate_arrival_timestamp: Option<DateTime<Utc>>,
    pub data: DecodedPayload,
    pub encryption_type: Option<String>,
    pub partition_key: String,
    pub sequence_number: String,
}

/// Decodes one vendor record: reverses compression or base64, follows an
/// `@S3Item` sentinel to the blob store if present, then JSON-parses per
/// `config.json_parse`. A JSON parse failure degrades to the raw text rather
/// than propagating — it is logged and nothing more.
pub async fn decode(config: &CodecConfig, blobs: Option<&dyn BlobStore>, record: RawRecord) -> Result<DecodedRecord> {
    let mut body = if config.compression != crate::Compression::None {
        compression::decompress(config.compression, &record.data).await?
    } else if config.output_encoding == OutputEncoding::Base64 {
        base64::decode(&record.data).unwrap_or(record.data.clone())
    } else {
        record.data.clone()
    };

    if let Ok(sentinel) = serde_json::from_slice::<S3ItemSentinel>(&body) {
        if let Some(blobs) = blobs {
            body = blobs.get(&sentinel.item).await?;
        } else {
            tracing::warn!(key = %sentinel.item.key, "record references an @S3Item but no blob store is configured");
        }
    }

    let data = parse_payload(config.json_parse, body);

    Ok(DecodedRecord {
        approximate_arrival_timestamp: record.approximate_arrival_timestamp,
        data,
        encryption_type: record.encryption_type,
        partition_key: record.partition_key,
        sequence_number: record.sequence_number,
    })
}

lazy_static::lazy_static! {
    static ref JSON_LOOKING: regex::Regex = regex::Regex::new(r"(?s)^[{\[].*[}\]]$").unwrap();
}

fn looks_like_json(text: &str) -> bool {
    JSON_LOOKING.is_match(text.trim())
}

fn parse_payload(mode: JsonParseMode, body: Vec<u8>) -> DecodedPayload {
    let should_attempt = match mode {
        JsonParseMode::False => false,
        JsonParseMode::True => true,
        JsonParseMode::Auto => std::str::from_utf8(&body).map(looks_like_json).unwrap_or(false),
    };

    if !should_attempt {
        return match String::from_utf8(body) {
            Ok(text) => DecodedPayload::Text(text),
            Err(err) => DecodedPayload::Bytes(err.into_bytes()),
        };
    }

    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => DecodedPayload::Json(value),
        Err(err) => {
            tracing::warn!(error = %err, "failed to JSON-parse record body; returning raw text");
            match String::from_utf8(body) {
                Ok(text) => DecodedPayload::Text(text),
                Err(err) => DecodedPayload::Bytes(err.into_bytes()),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(data: &[u8]) -> RawRecord {
        RawRecord {
            data: data.to_vec(),
            partition_key: "pk".into(),
            sequence_number: "1".into(),
            approximate_arrival_timestamp: None,
            encryption_type: None,
        }
    }

    #[tokio::test]
    async fn auto_mode_parses_json_looking_bodies() {
        let config = CodecConfig::default();
        let decoded = decode(&config, None, raw(br#"{"a":1}"#)).await.unwrap();
        assert_eq!(decoded.data, DecodedPayload::Json(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn auto_mode_leaves_plain_text_alone() {
        let config = CodecConfig::default();
        let decoded = decode(&config, None, raw(b"hello world")).await.unwrap();
        assert_eq!(decoded.data, DecodedPayload::Text("hello world".into()));
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_text_instead_of_erroring() {
        let config = CodecConfig {
            json_parse: JsonParseMode::True,
            ..CodecConfig::default()
        };
        let decoded = decode(&config, None, raw(b"{not valid json")).await.unwrap();
        assert!(matches!(decoded.data, DecodedPayload::Text(_)));
    }
}
