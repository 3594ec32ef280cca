//! Session counters
//!
//! Lock-free counters updated by the ingestion task and read by status
//! consumers, plus a bounded latency sample for book applies.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Counters for one `OrderBookSession`.
#[derive(Debug)]
pub struct SessionMetrics {
    // Connection lifecycle
    pub connect_attempts: AtomicU64,
    pub connect_failures: AtomicU64,
    pub reconnects: AtomicU64,
    pub heartbeat_timeouts: AtomicU64,
    pub pings_sent: AtomicU64,
    pub symbol_changes: AtomicU64,

    // Message processing
    pub frames_received: AtomicU64,
    pub events_applied: AtomicU64,
    pub events_ignored: AtomicU64,
    pub decode_errors: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            heartbeat_timeouts: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            symbol_changes: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_symbol_change(&self) {
        self.symbol_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event applied to the book and how long the apply took.
    pub fn record_event_applied(&self, latency_ns: u64) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.apply_latency_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(latency_ns);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as a BTreeMap.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("connect_attempts".to_string(), self.connect_attempts.load(Ordering::Relaxed));
        m.insert("connect_failures".to_string(), self.connect_failures.load(Ordering::Relaxed));
        m.insert("reconnects".to_string(), self.reconnects.load(Ordering::Relaxed));
        m.insert("heartbeat_timeouts".to_string(), self.heartbeat_timeouts.load(Ordering::Relaxed));
        m.insert("pings_sent".to_string(), self.pings_sent.load(Ordering::Relaxed));
        m.insert("symbol_changes".to_string(), self.symbol_changes.load(Ordering::Relaxed));
        m.insert("frames_received".to_string(), self.frames_received.load(Ordering::Relaxed));
        m.insert("events_applied".to_string(), self.events_applied.load(Ordering::Relaxed));
        m.insert("events_ignored".to_string(), self.events_ignored.load(Ordering::Relaxed));
        m.insert("decode_errors".to_string(), self.decode_errors.load(Ordering::Relaxed));

        let tracker = self.apply_latency_ns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p50) = tracker.percentile(50) {
            m.insert("apply_latency_p50_ns".to_string(), p50);
        }
        if let Some(p99) = tracker.percentile(99) {
            m.insert("apply_latency_p99_ns".to_string(), p99);
        }
        m
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
#[derive(Debug)]
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    /// Record a latency sample, evicting the oldest when full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100), nearest-rank.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = p.min(100) * (sorted.len() - 1) / 100;
        Some(sorted[idx])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_exported() {
        let metrics = SessionMetrics::new();
        metrics.record_connect_attempt();
        metrics.record_connect_attempt();
        metrics.record_connect_failure();
        metrics.record_decode_error();
        metrics.record_event_applied(1_500);

        let exported = metrics.export();
        assert_eq!(exported["connect_attempts"], 2);
        assert_eq!(exported["connect_failures"], 1);
        assert_eq!(exported["decode_errors"], 1);
        assert_eq!(exported["events_applied"], 1);
        assert_eq!(exported["apply_latency_p99_ns"], 1_500);
        assert_eq!(exported["reconnects"], 0);
    }

    #[test]
    fn test_no_latency_keys_without_samples() {
        let exported = SessionMetrics::new().export();
        assert!(!exported.contains_key("apply_latency_p50_ns"));
    }

    #[test]
    fn test_latency_tracker_percentiles() {
        let mut tracker = LatencyTracker::new(100);
        for i in 1..=100 {
            tracker.record(i);
        }
        assert_eq!(tracker.percentile(0), Some(1));
        assert_eq!(tracker.percentile(50), Some(50));
        assert_eq!(tracker.percentile(100), Some(100));
    }

    #[test]
    fn test_latency_tracker_bounded() {
        let mut tracker = LatencyTracker::new(3);
        for i in 1..=5 {
            tracker.record(i);
        }
        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.percentile(0), Some(3));
    }
}
