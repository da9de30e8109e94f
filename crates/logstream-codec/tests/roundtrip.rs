//! Cross-module round-trip properties for the record codec (§8, invariant 5).

use logstream_codec::{decode, encode, CodecConfig, DecodedPayload, EncodeRequest, RawRecord, RecordPayload};
use quickcheck_macros::quickcheck;

fn raw_from(data: Vec<u8>, partition_key: String) -> RawRecord {
    RawRecord {
        data,
        partition_key,
        sequence_number: "1".into(),
        approximate_arrival_timestamp: None,
        encryption_type: None,
    }
}

/// With no compression and JSON parsing disabled, encoding then decoding a
/// UTF-8 string is the identity on its text body: `decode(encode(v)).data == v`.
#[quickcheck]
fn encode_then_decode_is_the_identity_on_plain_text(body: String) -> bool {
    let config = CodecConfig {
        json_parse: logstream_codec::JsonParseMode::False,
        ..CodecConfig::default()
    };

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let encoded = encode(
            &config,
            None,
            "my-log",
            EncodeRequest {
                data: Some(RecordPayload::Bytes(body.clone().into_bytes())),
                partition_key: Some("pk".into()),
                ..EncodeRequest::default()
            },
        )
        .await
        .unwrap();

        let decoded = decode(&config, None, raw_from(encoded.data, encoded.partition_key)).await.unwrap();

        matches!(decoded.data, DecodedPayload::Text(text) if text == body)
    })
}

/// A JSON object round-trips through `serde_json::Value` equality, not byte
/// equality (key order / whitespace aren't preserved).
#[tokio::test]
async fn encode_then_decode_preserves_json_value_equality() {
    let config = CodecConfig::default();
    let value = serde_json::json!({"shard": "0001", "count": 3, "tags": ["a", "b"]});

    let encoded = encode(
        &config,
        None,
        "my-log",
        EncodeRequest {
            data: Some(RecordPayload::Json(value.clone())),
            ..EncodeRequest::default()
        },
    )
    .await
    .unwrap();

    let decoded = decode(&config, None, raw_from(encoded.data, encoded.partition_key)).await.unwrap();

    assert_eq!(decoded.data, DecodedPayload::Json(value));
}
