use logstream_codec::CodecConfig;
use logstream_types::IteratorPosition;
use std::time::Duration;

/// Tuning passed down from the facade's `ClientConfig`, already clamped.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub heartbeat_interval: Duration,
    pub heartbeat_failure_timeout: Duration,
    pub acquire_leases_interval: Duration,
    pub acquire_leases_retry_interval: Duration,
    pub lease_term: Duration,
    /// Fraction of `lease_term` before expiration at which a held lease is
    /// treated as needing renewal (25% per spec).
    pub lease_renewal_offset_fraction: f64,
    pub limit: i32,
    pub poll_delay: Duration,
    pub no_records_poll_delay: Duration,
    /// Position to start from when a shard has no checkpoint yet.
    pub initial_position: IteratorPosition,
    pub use_auto_checkpoints: bool,
    pub use_paused_polling: bool,
    pub use_enhanced_fan_out: bool,
    pub standalone: bool,
    pub codec: CodecConfig,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_failure_timeout: Duration::from_secs(45),
            acquire_leases_interval: Duration::from_secs(20),
            acquire_leases_retry_interval: Duration::from_secs(5),
            lease_term: Duration::from_secs(300),
            lease_renewal_offset_fraction: 0.25,
            limit: 10_000,
            poll_delay: Duration::from_millis(250),
            no_records_poll_delay: Duration::from_millis(1_000),
            initial_position: IteratorPosition::Latest,
            use_auto_checkpoints: true,
            use_paused_polling: false,
            use_enhanced_fan_out: false,
            standalone: false,
            codec: CodecConfig::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let settings = ConsumerSettings::default();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(settings.lease_term, Duration::from_secs(300));
        assert_eq!(settings.lease_renewal_offset_fraction, 0.25);
        assert_eq!(settings.initial_position, IteratorPosition::Latest);
        assert!(settings.use_auto_checkpoints);
        assert!(!settings.standalone);
    }
}
