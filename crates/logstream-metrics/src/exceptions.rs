use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A non-fatal exception seen at least once, for surfacing alongside counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentException {
    pub message: String,
    pub count: u64,
}

/// Bounded, most-recently-seen-first record of exception messages. Repeats of an
/// already-tracked message bump its count and move it to the front; once full,
/// the least-recently-seen message is evicted to make room for a new one.
pub(crate) struct RecentExceptions {
    cache: Mutex<LruCache<String, u64>>,
}

impl RecentExceptions {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub(crate) fn record(&self, message: String) {
        let mut cache = self.cache.lock().unwrap();
        let count = cache.get(&message).copied().unwrap_or(0) + 1;
        cache.put(message, count);
    }

    pub(crate) fn snapshot(&self) -> Vec<RecentException> {
        let cache = self.cache.lock().unwrap();
        cache
            .iter()
            .map(|(message, count)| RecentException {
                message: message.clone(),
                count: *count,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn evicts_least_recently_seen_once_full() {
        let exceptions = RecentExceptions::new(2);
        exceptions.record("a".into());
        exceptions.record("b".into());
        exceptions.record("c".into());

        let snapshot = exceptions.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|e| e.message != "a"));
    }
}
