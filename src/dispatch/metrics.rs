//! Metrics emitted by the dispatcher.
//!
//! Only counters and timers are recorded, both commutative, so concurrent
//! dispatches never need to coordinate.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Destination for dispatcher metrics.
///
/// Implementations must not block and cannot fail from the caller's point
/// of view.
pub trait MetricsSink: Send + Sync {
    fn increment_count(&self, name: &str, delta: u64);
    fn record_duration(&self, name: &str, duration: Duration);
}

/// Aggregated timer samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
}

/// Point-in-time copy of an [`InMemoryMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerStats>,
}

/// Process-local metrics sink backing the `/_metrics` endpoint.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, u64>,
    timers: DashMap<String, TimerStats>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn timer(&self, name: &str) -> Option<TimerStats> {
        self.timers.get(name).map(|v| *v)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            timers: self
                .timers
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_count(&self, name: &str, delta: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += delta;
        debug!(metric = %name, delta, "count");
    }

    fn record_duration(&self, name: &str, duration: Duration) {
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let mut stats = self.timers.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total_us = stats.total_us.saturating_add(us);
        stats.max_us = stats.max_us.max(us);
        debug!(metric = %name, duration = ?duration, "time");
    }
}

/// Metric names for one app, all sharing the `dispatch.<app>.` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricNames {
    pub requests: String,
    pub succeeded: String,
    pub error: String,
    pub time: String,
}

impl MetricNames {
    pub fn for_app(app: &str) -> Self {
        let prefix = format!("dispatch.{}.", app);
        Self {
            requests: format!("{}requests", prefix),
            succeeded: format!("{}succeeded", prefix),
            error: format!("{}error", prefix),
            time: format!("{}time", prefix),
        }
    }
}

/// Times the executing phase and records its outcome exactly once.
///
/// If the timer is dropped without [`finish`](ExecutionTimer::finish), e.g.
/// because the dispatch future was abandoned after the client went away, the
/// execution counts as an error.
pub(crate) struct ExecutionTimer<'a> {
    sink: &'a dyn MetricsSink,
    names: &'a MetricNames,
    start: Instant,
    done: bool,
}

impl<'a> ExecutionTimer<'a> {
    pub(crate) fn start(sink: &'a dyn MetricsSink, names: &'a MetricNames) -> Self {
        Self {
            sink,
            names,
            start: Instant::now(),
            done: false,
        }
    }

    pub(crate) fn finish(mut self, succeeded: bool) -> Duration {
        self.record(succeeded)
    }

    fn record(&mut self, succeeded: bool) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.done {
            self.done = true;
            let outcome = if succeeded {
                &self.names.succeeded
            } else {
                &self.names.error
            };
            self.sink.increment_count(outcome, 1);
            self.sink.record_duration(&self.names.time, elapsed);
        }
        elapsed
    }
}

impl Drop for ExecutionTimer<'_> {
    fn drop(&mut self) {
        self.record(false);
    }
}
