use crate::error::ConfigError;
use logstream_codec::{CodecConfig, JsonParseMode, OutputEncoding};
use logstream_consumer::ConsumerSettings;
use logstream_types::IteratorPosition;
use std::collections::HashMap;
use std::time::Duration;

/// Where a reader should start when a shard has no stored checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialPositionInStream {
    Latest,
    TrimHorizon,
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub key_id: String,
}

/// All user-facing knobs, enumerated in full (§6). `build()` performs the
/// clamping and validation that `ClientConfig::default()` alone does not.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub log_name: String,
    pub consumer_group: String,
    pub create_stream_if_needed: bool,
    pub shard_count: i32,
    pub encryption: Option<EncryptionConfig>,
    pub compression: Option<String>,

    pub limit: i32,
    pub no_records_poll_delay_ms: i64,
    pub poll_delay_ms: i64,

    pub use_auto_checkpoints: bool,
    pub use_auto_shard_assignment: bool,
    pub use_enhanced_fan_out: bool,
    pub use_paused_polling: bool,
    pub use_s3_for_large_items: bool,
    pub s3_bucket: Option<String>,

    pub large_item_threshold_kb: usize,
    pub non_s3_keys: Vec<String>,
    pub initial_position_in_stream: InitialPositionInStream,
    pub max_enhanced_consumers: u32,
    pub stats_interval_ms: u64,
    pub tags: HashMap<String, String>,

    pub heartbeat_interval_ms: u64,
    pub acquire_leases_interval_ms: u64,
    pub lease_term_ms: u64,
    pub capture_stack_trace: bool,

    pub coordinator_table_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_name: String::new(),
            consumer_group: "default".into(),
            create_stream_if_needed: true,
            shard_count: 1,
            encryption: None,
            compression: None,

            limit: 10_000,
            no_records_poll_delay_ms: 1_000,
            poll_delay_ms: 250,

            use_auto_checkpoints: true,
            use_auto_shard_assignment: true,
            use_enhanced_fan_out: false,
            use_paused_polling: false,
            use_s3_for_large_items: false,
            s3_bucket: None,

            large_item_threshold_kb: 400,
            non_s3_keys: Vec::new(),
            initial_position_in_stream: InitialPositionInStream::Latest,
            max_enhanced_consumers: 5,
            stats_interval_ms: 30_000,
            tags: HashMap::new(),

            heartbeat_interval_ms: 15_000,
            acquire_leases_interval_ms: 20_000,
            lease_term_ms: 300_000,
            capture_stack_trace: std::env::var("LOGSTREAM_CAPTURE_STACK_TRACE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),

            coordinator_table_name: "logstream-coordinator".into(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfig {
        ClientConfig::default()
    }

    /// Clamps boundary values and rejects configuration that cannot be
    /// resolved to a running facade (§8 boundary behaviours).
    pub fn build(mut self) -> Result<ClientConfig, ConfigError> {
        self.limit = if self.limit <= 0 || self.limit > 10_000 { 10_000 } else { self.limit };
        self.no_records_poll_delay_ms = self.no_records_poll_delay_ms.max(250);
        self.poll_delay_ms = if self.poll_delay_ms < 0 { 250 } else { self.poll_delay_ms };
        self.stats_interval_ms = self.stats_interval_ms.max(1_000);

        if self.use_s3_for_large_items && self.s3_bucket.is_none() {
            return Err(ConfigError::MissingField {
                field: "s3_bucket",
                reason: "use_s3_for_large_items is set",
            });
        }

        // Validated but not stored: `compression` is consumed below into the
        // codec config, matching it against the vendor-legacy name or a
        // real algorithm this codec actually implements.
        parse_compression(self.compression.as_deref())?;

        Ok(self)
    }

    pub(crate) fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_failure_timeout: Duration::from_millis(self.heartbeat_interval_ms * 3),
            acquire_leases_interval: Duration::from_millis(self.acquire_leases_interval_ms),
            acquire_leases_retry_interval: Duration::from_secs(5),
            lease_term: Duration::from_millis(self.lease_term_ms),
            lease_renewal_offset_fraction: 0.25,
            limit: self.limit,
            poll_delay: Duration::from_millis(self.poll_delay_ms.max(0) as u64),
            no_records_poll_delay: Duration::from_millis(self.no_records_poll_delay_ms.max(0) as u64),
            initial_position: match self.initial_position_in_stream {
                InitialPositionInStream::Latest => IteratorPosition::Latest,
                InitialPositionInStream::TrimHorizon => IteratorPosition::TrimHorizon,
            },
            use_auto_checkpoints: self.use_auto_checkpoints,
            use_paused_polling: self.use_paused_polling,
            use_enhanced_fan_out: self.use_enhanced_fan_out,
            standalone: !self.use_auto_shard_assignment,
            codec: self.codec_config(),
        }
    }

    pub(crate) fn codec_config(&self) -> CodecConfig {
        let compression = parse_compression(self.compression.as_deref()).unwrap_or_default();
        CodecConfig {
            compression,
            output_encoding: OutputEncoding::Buffer,
            json_parse: JsonParseMode::Auto,
            use_s3_for_large_items: self.use_s3_for_large_items,
            large_item_threshold_bytes: self.large_item_threshold_kb * 1024,
            non_s3_keys: self.non_s3_keys.clone(),
        }
    }
}

fn parse_compression(name: Option<&str>) -> Result<logstream_codec::Compression, ConfigError> {
    match name {
        None => Ok(logstream_codec::Compression::None),
        Some("LZ-UTF8") => Ok(logstream_codec::Compression::None),
        Some("gzip") => Ok(logstream_codec::Compression::Gzip),
        Some("zstd") => Ok(logstream_codec::Compression::Zstd),
        Some(other) => Err(ConfigError::UnknownCompression(other.to_owned())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limit_above_the_ceiling_clamps_down() {
        let config = ClientConfig {
            limit: 50_000,
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap();
        assert_eq!(config.limit, 10_000);
    }

    #[test]
    fn non_positive_limit_clamps_to_the_ceiling() {
        let config = ClientConfig {
            limit: 0,
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap();
        assert_eq!(config.limit, 10_000);
    }

    #[test]
    fn no_records_poll_delay_below_the_floor_clamps_up() {
        let config = ClientConfig {
            no_records_poll_delay_ms: 10,
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap();
        assert_eq!(config.no_records_poll_delay_ms, 250);
    }

    #[test]
    fn negative_poll_delay_clamps_to_default() {
        let config = ClientConfig {
            poll_delay_ms: -5,
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap();
        assert_eq!(config.poll_delay_ms, 250);
    }

    #[test]
    fn unknown_compression_name_is_rejected() {
        let err = ClientConfig {
            compression: Some("snappy".into()),
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCompression(name) if name == "snappy"));
    }

    #[test]
    fn s3_offload_without_a_bucket_is_rejected() {
        let err = ClientConfig {
            use_s3_for_large_items: true,
            log_name: "stream".into(),
            ..ClientConfig::default()
        }
        .build()
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "s3_bucket", .. }));
    }
}
