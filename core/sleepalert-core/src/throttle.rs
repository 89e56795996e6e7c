//! Rate limiting for repeated failure logs.
//!
//! The first occurrence of a key is always emitted; repeats are dropped until
//! `interval` has passed, at which point the number of dropped repeats is
//! reported alongside the next emission.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_emitted: Instant,
    suppressed: u64,
}

#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    entries: HashMap<(&'static str, &'static str), Entry>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: HashMap::new(),
        }
    }

    /// Returns `Some(suppressed_since_last)` when the caller should log now.
    pub fn check(&mut self, source: &'static str, key: &'static str, now: Instant) -> Option<u64> {
        match self.entries.get_mut(&(source, key)) {
            None => {
                self.entries.insert(
                    (source, key),
                    Entry {
                        last_emitted: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
            Some(entry) if now.saturating_duration_since(entry.last_emitted) >= self.interval => {
                let suppressed = entry.suppressed;
                entry.last_emitted = now;
                entry.suppressed = 0;
                Some(suppressed)
            }
            Some(entry) => {
                entry.suppressed = entry.suppressed.saturating_add(1);
                None
            }
        }
    }

    /// Forgets every key for `source`. Returns whether anything was being tracked,
    /// i.e. whether the source is recovering from failures.
    pub fn clear_source(&mut self, source: &'static str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_source, _), _| *entry_source != source);
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_is_emitted_then_suppressed() {
        let mut throttle = LogThrottle::new(Duration::from_secs(300));
        let start = Instant::now();

        assert_eq!(throttle.check("display", "permission_denied", start), Some(0));
        assert_eq!(throttle.check("display", "permission_denied", start + Duration::from_secs(10)), None);
        assert_eq!(throttle.check("display", "permission_denied", start + Duration::from_secs(20)), None);
        assert_eq!(
            throttle.check("display", "permission_denied", start + Duration::from_secs(301)),
            Some(2)
        );
    }

    #[test]
    fn keys_are_independent() {
        let mut throttle = LogThrottle::new(Duration::from_secs(300));
        let now = Instant::now();

        assert_eq!(throttle.check("display", "io", now), Some(0));
        assert_eq!(throttle.check("power", "io", now), Some(0));
        assert_eq!(throttle.check("display", "parse", now), Some(0));
    }

    #[test]
    fn clearing_a_source_reports_recovery() {
        let mut throttle = LogThrottle::new(Duration::from_secs(300));
        let now = Instant::now();

        assert!(!throttle.clear_source("power"));
        throttle.check("power", "command_failed", now);
        assert!(throttle.clear_source("power"));
        assert_eq!(throttle.check("power", "command_failed", now), Some(0));
    }
}
