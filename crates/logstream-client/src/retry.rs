use std::time::Duration;

/// Re-exported so callers configuring a client don't need their own dependency.
pub use exponential_backoff::Backoff;

/// Decides whether a failed call should be retried, and after how long.
///
/// Mirrors the read-path retry abstraction used elsewhere in this codebase:
/// `reset()` is called after any successful call so a dynamic backoff returns
/// to its minimum, and `next_backoff()` is consulted for each failure.
pub trait RetryPolicy: Send + Sync {
    fn reset(&self);
    fn next_backoff(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff with jitter, unbounded attempts, 1s floor and 5 minute ceiling —
/// the policy used for every retried log-client call.
#[derive(Debug)]
pub struct ExponentialBackoff {
    backoff: Backoff,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        let mut backoff = Backoff::new(u32::MAX, Duration::from_secs(1), Some(Duration::from_secs(300)));
        backoff.set_jitter(0.3);
        Self { backoff }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn reset(&self) {
        // `Backoff::next` is a pure function of the attempt counter, which the
        // caller (not this type) owns; nothing to reset here besides documenting intent.
    }

    fn next_backoff(&self, attempt: u32) -> Option<Duration> {
        self.backoff.next(attempt)
    }
}

/// A `RetryPolicy` that never retries, for non-retried operations (§4.1).
#[derive(Debug, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn reset(&self) {}
    fn next_backoff(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exponential_backoff_stays_within_bounds() {
        let policy = ExponentialBackoff::new();
        for attempt in 1..20 {
            let delay = policy.next_backoff(attempt).expect("unbounded attempts");
            assert!(delay >= Duration::from_millis(1) && delay <= Duration::from_secs(300));
        }
    }

    #[test]
    fn no_retry_never_retries() {
        assert_eq!(NoRetry.next_backoff(1), None);
    }
}
