//! Per-pod suppression of repeated identical error messages.
//!
//! CRI failures tend to repeat every sync cycle; without a gate a broken
//! runtime floods the log. One line per (pod, message) per window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    message: String,
    printed_at: Instant,
}

pub struct LogReducer {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl LogReducer {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(
            pkg_constants::runtime::LOG_REDUCTION_WINDOW_SECONDS,
        ))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `message` for `id` should be printed now. Records the print
    /// when it returns true.
    pub fn should_print(&self, id: &str, message: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(id)
            && entry.message == message
            && entry.printed_at.elapsed() < self.window
        {
            return false;
        }
        entries.insert(
            id.to_string(),
            Entry {
                message: message.to_string(),
                printed_at: Instant::now(),
            },
        );
        true
    }

    /// Forget the entry for `id`, typically once the pod recovers or goes
    /// away.
    pub fn clear(&self, id: &str) {
        self.entries.lock().unwrap().remove(id);
    }
}

impl Default for LogReducer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_message_suppressed_within_window() {
        let reducer = LogReducer::new();
        assert!(reducer.should_print("u1", "status failed"));
        assert!(!reducer.should_print("u1", "status failed"));
        assert!(!reducer.should_print("u1", "status failed"));
    }

    #[test]
    fn test_different_message_prints() {
        let reducer = LogReducer::new();
        assert!(reducer.should_print("u1", "status failed"));
        assert!(reducer.should_print("u1", "timeout"));
        // The newer message replaced the entry, so the old one prints again.
        assert!(reducer.should_print("u1", "status failed"));
    }

    #[test]
    fn test_pods_are_independent() {
        let reducer = LogReducer::new();
        assert!(reducer.should_print("u1", "status failed"));
        assert!(reducer.should_print("u2", "status failed"));
    }

    #[test]
    fn test_window_expiry() {
        let reducer = LogReducer::with_window(Duration::from_millis(0));
        assert!(reducer.should_print("u1", "status failed"));
        assert!(reducer.should_print("u1", "status failed"));
    }

    #[test]
    fn test_clear_forgets() {
        let reducer = LogReducer::new();
        assert!(reducer.should_print("u1", "status failed"));
        reducer.clear("u1");
        assert!(reducer.should_print("u1", "status failed"));
    }
}
