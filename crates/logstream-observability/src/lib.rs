//! Installs a process-wide `tracing` subscriber for the facade and any CLI entry points.
//!
//! Mirrors the layered-subscriber setup used throughout the client: an `EnvFilter`
//! driven by `RUST_LOG` (falling back to `info`), and either a human-readable or
//! JSON-formatted `fmt` layer depending on the target environment.

use tracing_subscriber::prelude::*;

/// Output format for emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, suited to a local terminal.
    Pretty,
    /// Newline-delimited JSON, suited to log collection pipelines.
    Json,
}

/// Installs the global subscriber. Returns a guard that, when dropped, restores the
/// previous default subscriber; the facade holds this for its lifetime and drops it
/// in `stop()`.
pub fn install(format: LogFormat) -> tracing::subscriber::DefaultGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).set_default(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .set_default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn install_and_log_does_not_panic() {
        let _guard = install(LogFormat::Pretty);
        tracing::info!(answer = 42, "hello from a test");
    }
}
