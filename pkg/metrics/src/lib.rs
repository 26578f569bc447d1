//! Lightweight, thread-safe metrics for podsync.
//!
//! Renders in Prometheus text exposition format. The main consumer is the
//! instrumented CRI client, which records an invocation count, an error
//! count, and a latency observation per runtime operation.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Thread-safe registry of counters, gauges, and duration statistics.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
    durations: RwLock<BTreeMap<String, DurationStat>>,
}

/// Monotonically increasing counter.
struct Counter {
    value: AtomicU64,
    help: String,
}

/// Value that can go up or down.
struct Gauge {
    value: AtomicI64,
    help: String,
}

/// Observation count plus cumulative milliseconds for one timed operation.
struct DurationStat {
    count: AtomicU64,
    sum_ms: AtomicU64,
    help: String,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            durations: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        let mut counters = self.counters.write().unwrap();
        counters.entry(name.to_string()).or_insert_with(|| Counter {
            value: AtomicU64::new(0),
            help: help.to_string(),
        });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        let mut gauges = self.gauges.write().unwrap();
        gauges.entry(name.to_string()).or_insert_with(|| Gauge {
            value: AtomicI64::new(0),
            help: help.to_string(),
        });
    }

    /// Register a duration statistic. If it already exists, this is a no-op.
    pub fn register_duration(&self, name: &str, help: &str) {
        let mut durations = self.durations.write().unwrap();
        durations
            .entry(name.to_string())
            .or_insert_with(|| DurationStat {
                count: AtomicU64::new(0),
                sum_ms: AtomicU64::new(0),
                help: help.to_string(),
            });
    }

    /// Increment a counter by 1. Unregistered names are ignored.
    pub fn counter_inc(&self, name: &str) {
        let counters = self.counters.read().unwrap();
        if let Some(c) = counters.get(name) {
            c.value.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read a counter's current value. `None` for unregistered names.
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        let counters = self.counters.read().unwrap();
        counters.get(name).map(|c| c.value.load(Ordering::Relaxed))
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        let gauges = self.gauges.read().unwrap();
        if let Some(g) = gauges.get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    /// Record one observation of a timed operation.
    pub fn observe_duration(&self, name: &str, elapsed: Duration) {
        let durations = self.durations.read().unwrap();
        if let Some(d) = durations.get(name) {
            d.count.fetch_add(1, Ordering::Relaxed);
            d.sum_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        }
    }

    /// Read a duration stat as (observation count, cumulative milliseconds).
    pub fn duration_value(&self, name: &str) -> Option<(u64, u64)> {
        let durations = self.durations.read().unwrap();
        durations.get(name).map(|d| {
            (
                d.count.load(Ordering::Relaxed),
                d.sum_ms.load(Ordering::Relaxed),
            )
        })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read().unwrap();
        for (name, counter) in counters.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                counter.value.load(Ordering::Relaxed)
            ));
        }

        let gauges = self.gauges.read().unwrap();
        for (name, gauge) in gauges.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                gauge.value.load(Ordering::Relaxed)
            ));
        }

        let durations = self.durations.read().unwrap();
        for (name, stat) in durations.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, stat.help));
            output.push_str(&format!("# TYPE {} summary\n", name));
            output.push_str(&format!(
                "{}_count {}\n",
                name,
                stat.count.load(Ordering::Relaxed)
            ));
            output.push_str(&format!(
                "{}_sum_ms {}\n",
                name,
                stat.sum_ms.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
