use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Abstracts wall-clock time so the lease coordinator, heartbeat manager, and
/// readers can be driven deterministically in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The default `Clock`, backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A `Clock` whose value only changes when explicitly advanced, for fake-timer tests.
#[derive(Debug)]
pub struct FakeClock(Mutex<DateTime<Utc>>);

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.0.lock().unwrap() = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.lock().unwrap();
        *guard += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fake_clock_only_moves_when_advanced() {
        let epoch = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FakeClock::new(epoch);
        assert_eq!(clock.now(), epoch);

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), epoch + chrono::Duration::seconds(30));
    }
}
