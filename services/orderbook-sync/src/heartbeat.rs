//! Application-level heartbeat for protocols that need one
//!
//! The monitor is a pure deadline calculator: the read loop sleeps until
//! `next_deadline()`, then asks `poll()` what to do. Any inbound frame
//! counts as proof of life.

use tokio::time::{Duration, Instant};
use types::errors::TimeoutError;

/// Timer resolution. Deadlines land one tick past the limit so that a
/// wake-up always satisfies the strict comparisons in `poll`.
const TICK: Duration = Duration::from_millis(1);

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between outbound pings (default: 15s).
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead (default: 30s).
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
        }
    }
}

/// What the read loop should do at a heartbeat deadline.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatAction {
    /// Nothing due yet.
    Idle,
    /// Send a ping and call `record_ping`.
    SendPing,
    /// No inbound message within the timeout.
    TimedOut(TimeoutError),
}

/// Tracks last inbound message and last outbound ping for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_message: Instant,
    last_ping: Instant,
}

impl HeartbeatMonitor {
    /// Start tracking a connection that came up at `now`.
    pub fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_message: now,
            last_ping: now,
        }
    }

    /// Record an inbound frame of any kind.
    pub fn record_message(&mut self, now: Instant) {
        self.last_message = now;
    }

    /// Record that a ping was written.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = now;
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_message)
    }

    /// Check if the connection is stale (silent for longer than the timeout).
    pub fn is_stale(&self, now: Instant) -> bool {
        self.silent_for(now) > self.config.timeout
    }

    pub fn poll(&self, now: Instant) -> HeartbeatAction {
        if self.is_stale(now) {
            return HeartbeatAction::TimedOut(TimeoutError {
                silent_for_ms: duration_ms(self.silent_for(now)),
                limit_ms: duration_ms(self.config.timeout),
            });
        }
        if now.saturating_duration_since(self.last_ping) > self.config.ping_interval {
            return HeartbeatAction::SendPing;
        }
        HeartbeatAction::Idle
    }

    /// The earlier of the next ping and the timeout.
    pub fn next_deadline(&self) -> Instant {
        let ping_due = self.last_ping + self.config.ping_interval;
        let timeout_due = self.last_message + self.config.timeout;
        ping_due.min(timeout_due) + TICK
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_default_config() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, secs(15));
        assert_eq!(config.timeout, secs(30));
    }

    #[test]
    fn test_idle_until_ping_due() {
        let t0 = Instant::now();
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::default(), t0);

        assert_eq!(monitor.poll(t0 + secs(14)), HeartbeatAction::Idle);
        assert_eq!(monitor.poll(t0 + secs(15)), HeartbeatAction::Idle);
        assert_eq!(monitor.poll(t0 + secs(15) + TICK), HeartbeatAction::SendPing);
        assert_eq!(monitor.next_deadline(), t0 + secs(15) + TICK);
    }

    #[test]
    fn test_ping_resets_ping_deadline_only() {
        let t0 = Instant::now();
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default(), t0);
        monitor.record_ping(t0 + secs(15));

        assert_eq!(monitor.poll(t0 + secs(20)), HeartbeatAction::Idle);
        // timeout (t0 + 30s) and the next ping (t0 + 30s) coincide
        assert_eq!(monitor.next_deadline(), t0 + secs(30) + TICK);
    }

    #[test]
    fn test_silence_times_out() {
        let t0 = Instant::now();
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default(), t0);
        monitor.record_ping(t0 + secs(15));

        match monitor.poll(t0 + secs(31)) {
            HeartbeatAction::TimedOut(err) => {
                assert_eq!(err.silent_for_ms, 31_000);
                assert_eq!(err.limit_ms, 30_000);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_timeout_is_not_stale() {
        let t0 = Instant::now();
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default(), t0);
        monitor.record_ping(t0 + secs(20));

        assert_eq!(monitor.poll(t0 + secs(30)), HeartbeatAction::Idle);
        assert!(matches!(
            monitor.poll(monitor.next_deadline()),
            HeartbeatAction::TimedOut(_)
        ));
    }

    #[test]
    fn test_messages_keep_connection_alive() {
        let t0 = Instant::now();
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default(), t0);

        monitor.record_message(t0 + secs(25));
        monitor.record_ping(t0 + secs(15));
        assert!(!monitor.is_stale(t0 + secs(50)));
        assert!(!monitor.is_stale(t0 + secs(55)));
        assert!(monitor.is_stale(t0 + secs(55) + TICK));
        assert_eq!(monitor.silent_for(t0 + secs(40)), secs(15));
    }
}
