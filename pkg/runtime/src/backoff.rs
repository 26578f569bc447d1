//! Exponential restart back-off, keyed by stable container identity.
//!
//! Keys are `"podUID_containerName_hash"` — the hash makes back-off history
//! drop across legitimate spec changes. The store is caller-supplied to the
//! sync loop and shared across pods, so it must tolerate concurrent use.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Entry {
    backoff: Duration,
    last_update: DateTime<Utc>,
}

/// Concurrent exponential back-off store.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    entries: DashMap<String, Entry>,
}

impl Backoff {
    pub fn new() -> Self {
        Self::with_params(
            Duration::from_secs(pkg_constants::runtime::BACKOFF_INITIAL_SECONDS),
            Duration::from_secs(pkg_constants::runtime::BACKOFF_CAP_SECONDS),
        )
    }

    pub fn with_params(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            entries: DashMap::new(),
        }
    }

    /// Stable key for a container within a pod.
    pub fn key(pod_uid: &str, container_name: &str, hash: &str) -> String {
        format!("{pod_uid}_{container_name}_{hash}")
    }

    /// Current back-off slot for `key`; zero when no history exists.
    pub fn get(&self, key: &str) -> Duration {
        self.entries
            .get(key)
            .map(|e| e.backoff)
            .unwrap_or(Duration::ZERO)
    }

    /// Whether a start at this moment, referenced to `event_time` (the
    /// container's last finish), still falls inside the current slot.
    pub fn is_in_backoff_since(&self, key: &str, event_time: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        if self.has_expired(&entry, Utc::now()) {
            return false;
        }
        let since_event = Utc::now().signed_duration_since(event_time);
        since_event
            .to_std()
            .map(|elapsed| elapsed < entry.backoff)
            .unwrap_or(true)
    }

    /// Whether the current slot, measured from the last recorded failure,
    /// is still running. The variant for callers with no external reference
    /// point (e.g. image pulls).
    pub fn is_in_backoff(&self, key: &str) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        let now = Utc::now();
        if self.has_expired(&entry, now) {
            return false;
        }
        now.signed_duration_since(entry.last_update)
            .to_std()
            .map(|elapsed| elapsed < entry.backoff)
            .unwrap_or(true)
    }

    /// Advance to the next slot, doubling up to the cap. History older than
    /// twice the cap is treated as stale and restarts from the initial slot.
    pub fn next(&self, key: &str, event_time: DateTime<Utc>) {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                backoff: Duration::ZERO,
                last_update: event_time,
            });
        if entry.backoff.is_zero() || self.has_expired(&entry, event_time) {
            entry.backoff = self.initial;
        } else {
            entry.backoff = std::cmp::min(entry.backoff * 2, self.cap);
        }
        entry.last_update = event_time;
    }

    /// Drop the history for `key`.
    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    fn has_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.last_update)
            .to_std()
            .map(|elapsed| elapsed > self.cap * 2)
            .unwrap_or(false)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_admits() {
        let backoff = Backoff::new();
        assert!(!backoff.is_in_backoff_since("k", Utc::now()));
        assert_eq!(backoff.get("k"), Duration::ZERO);
    }

    #[test]
    fn test_slots_double_to_cap() {
        let backoff = Backoff::with_params(Duration::from_secs(10), Duration::from_secs(25));
        let now = Utc::now();
        backoff.next("k", now);
        assert_eq!(backoff.get("k"), Duration::from_secs(10));
        backoff.next("k", now);
        assert_eq!(backoff.get("k"), Duration::from_secs(20));
        backoff.next("k", now);
        assert_eq!(backoff.get("k"), Duration::from_secs(25));
        backoff.next("k", now);
        assert_eq!(backoff.get("k"), Duration::from_secs(25));
    }

    #[test]
    fn test_recent_failure_is_refused() {
        let backoff = Backoff::new();
        let just_now = Utc::now();
        backoff.next("k", just_now);
        assert!(backoff.is_in_backoff_since("k", just_now));
    }

    #[test]
    fn test_old_failure_is_admitted() {
        let backoff = Backoff::new();
        let long_ago = Utc::now() - chrono::Duration::seconds(3600);
        backoff.next("k", long_ago);
        // The slot is measured from the finish time, which is far in the
        // past, so the refusal window has already elapsed.
        assert!(!backoff.is_in_backoff_since("k", long_ago));
    }

    #[test]
    fn test_stale_history_restarts_from_initial() {
        let backoff = Backoff::with_params(Duration::from_secs(10), Duration::from_secs(20));
        let long_ago = Utc::now() - chrono::Duration::seconds(3600);
        backoff.next("k", long_ago);
        backoff.next("k", long_ago);
        assert_eq!(backoff.get("k"), Duration::from_secs(20));
        // More than 2× the cap later, history is stale.
        backoff.next("k", Utc::now());
        assert_eq!(backoff.get("k"), Duration::from_secs(10));
    }

    #[test]
    fn test_keys_are_per_hash() {
        let a = Backoff::key("u1", "app", "h1");
        let b = Backoff::key("u1", "app", "h2");
        assert_ne!(a, b);

        let backoff = Backoff::new();
        backoff.next(&a, Utc::now());
        assert!(backoff.is_in_backoff_since(&a, Utc::now()));
        assert!(!backoff.is_in_backoff_since(&b, Utc::now()));
    }

    #[test]
    fn test_in_backoff_measured_from_last_failure() {
        let backoff = Backoff::new();
        assert!(!backoff.is_in_backoff("k"));
        backoff.next("k", Utc::now());
        assert!(backoff.is_in_backoff("k"));
    }

    #[test]
    fn test_reset_drops_history() {
        let backoff = Backoff::new();
        backoff.next("k", Utc::now());
        backoff.reset("k");
        assert_eq!(backoff.get("k"), Duration::ZERO);
    }
}
