//! A process-wide metrics handle: a fixed set of counters plus a bounded LRU of
//! recent non-fatal exceptions, both scraped as Prometheus text exposition format.
//!
//! Grounded as a typed replacement for a global mutable metrics table: every
//! counter is a named struct field, never a dynamically-keyed map.

mod exceptions;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

pub use exceptions::RecentException;
use exceptions::RecentExceptions;

/// Process-wide counters and diagnostics, held in an `Arc` and cloned into every
/// component that needs to report (the client, the lease coordinator, the
/// readers). Created by `Facade::start`, torn down by `Facade::shutdown`.
#[derive(Clone)]
pub struct MetricsHandle(Arc<Inner>);

struct Inner {
    registry: Registry,
    records_read: IntCounter,
    records_written: IntCounter,
    get_records_calls: IntCounter,
    put_records_calls: IntCounter,
    leases_acquired: IntCounter,
    leases_lost: IntCounter,
    retries: IntCounterVec,
    exceptions: RecentExceptions,
}

impl MetricsHandle {
    /// Builds a fresh handle backed by its own private registry, so multiple
    /// facades in the same process (as in tests) never collide on metric names.
    pub fn new() -> Self {
        let registry = Registry::new();

        let records_read = IntCounter::with_opts(Opts::new(
            "logstream_records_read_total",
            "Records handed to the application by a reader.",
        ))
        .expect("static metric options are valid");
        let records_written = IntCounter::with_opts(Opts::new(
            "logstream_records_written_total",
            "Records accepted by put_record/put_records.",
        ))
        .expect("static metric options are valid");
        let get_records_calls = IntCounter::with_opts(Opts::new(
            "logstream_get_records_calls_total",
            "get-records calls issued by pull readers.",
        ))
        .expect("static metric options are valid");
        let put_records_calls = IntCounter::with_opts(Opts::new(
            "logstream_put_records_calls_total",
            "put-records calls issued by the client.",
        ))
        .expect("static metric options are valid");
        let leases_acquired = IntCounter::with_opts(Opts::new(
            "logstream_leases_acquired_total",
            "Shard leases acquired by this process.",
        ))
        .expect("static metric options are valid");
        let leases_lost = IntCounter::with_opts(Opts::new(
            "logstream_leases_lost_total",
            "Shard leases lost to expiration or to a losing compare-and-swap.",
        ))
        .expect("static metric options are valid");
        let retries = IntCounterVec::new(
            Opts::new("logstream_retries_total", "Retried calls, by operation name."),
            &["operation"],
        )
        .expect("static metric options are valid");

        registry
            .register(Box::new(records_read.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(records_written.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(get_records_calls.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(put_records_calls.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(leases_acquired.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(leases_lost.clone()))
            .expect("metric names are unique within this registry");
        registry
            .register(Box::new(retries.clone()))
            .expect("metric names are unique within this registry");

        Self(Arc::new(Inner {
            registry,
            records_read,
            records_written,
            get_records_calls,
            put_records_calls,
            leases_acquired,
            leases_lost,
            retries,
            exceptions: RecentExceptions::new(64),
        }))
    }

    pub fn record_read(&self, count: u64) {
        self.0.records_read.inc_by(count);
    }

    pub fn record_written(&self, count: u64) {
        self.0.records_written.inc_by(count);
    }

    pub fn record_get_records_call(&self) {
        self.0.get_records_calls.inc();
    }

    pub fn record_put_records_call(&self) {
        self.0.put_records_calls.inc();
    }

    pub fn record_lease_acquired(&self) {
        self.0.leases_acquired.inc();
    }

    pub fn record_lease_lost(&self) {
        self.0.leases_lost.inc();
    }

    /// Recorded on every non-bailed retry attempt, keyed by the operation name
    /// the caller passed to the client's retry loop.
    pub fn record_retry(&self, operation: &str) {
        self.0.retries.with_label_values(&[operation]).inc();
    }

    /// Folds a non-fatal exception into the bounded recent-exceptions LRU,
    /// bumping its count if already present.
    pub fn record_exception(&self, message: impl Into<String>) {
        self.0.exceptions.record(message.into());
    }

    /// A snapshot of the most recently seen non-fatal exceptions, most-recent first.
    pub fn recent_exceptions(&self) -> Vec<RecentException> {
        self.0.exceptions.snapshot()
    }

    /// Renders all counters as Prometheus text exposition format.
    pub fn render(&self) -> String {
        let families = self.0.registry.gather();
        prometheus::TextEncoder::new()
            .encode_to_string(&families)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to encode metrics");
                String::new()
            })
    }

    /// Releases held resources. Currently a no-op beyond dropping the `Arc`;
    /// exists as a stable call site for `Facade::stop` regardless of future
    /// additions (background flush tasks, exporters) to this handle.
    pub fn shutdown(&self) {}
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_are_reflected_in_rendered_text() {
        let metrics = MetricsHandle::new();
        metrics.record_read(3);
        metrics.record_retry("get_records");
        metrics.record_retry("get_records");

        let rendered = metrics.render();
        assert!(rendered.contains("logstream_records_read_total 3"));
        assert!(rendered.contains("logstream_retries_total"));
        assert!(rendered.contains("operation=\"get_records\""));
    }

    #[test]
    fn recent_exceptions_counts_repeats() {
        let metrics = MetricsHandle::new();
        metrics.record_exception("boom");
        metrics.record_exception("boom");
        metrics.record_exception("bang");

        let snapshot = metrics.recent_exceptions();
        let boom = snapshot.iter().find(|e| e.message == "boom").unwrap();
        assert_eq!(boom.count, 2);
    }
}
