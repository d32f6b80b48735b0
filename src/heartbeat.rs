// ABOUTME: Per-session liveness tracking: last traffic time and unanswered heartbeat probes
// ABOUTME: Feeds the tick supervisor's idle, missed-probe and probe-due decisions

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Heartbeat and idle policy.
///
/// # Example
///
/// ```rust
/// use smsgate::heartbeat::HeartbeatConfig;
/// use std::time::Duration;
///
/// let config = HeartbeatConfig::new(Duration::from_secs(30))
///     .with_max_missed(5)
///     .with_force_close(Duration::from_secs(600));
/// assert_eq!(config.max_missed, 5);
/// ```
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Silence after which an ActiveTest probe is due (default: 60 seconds)
    pub interval: Duration,

    /// Probes sent without any traffic in between before the session is
    /// considered dead (default: 3)
    pub max_missed: u32,

    /// Silence after which the session is closed outright, whatever the
    /// probe count (default: 5 minutes)
    pub force_close: Duration,

    /// Time the peer gets between the terminate request and the hard close
    /// (default: 1 second)
    pub close_grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_missed: 3,
            force_close: Duration::from_secs(300),
            close_grace: Duration::from_secs(1),
        }
    }
}

impl HeartbeatConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_max_missed(mut self, max_missed: u32) -> Self {
        self.max_missed = max_missed;
        self
    }

    pub fn with_force_close(mut self, force_close: Duration) -> Self {
        self.force_close = force_close;
        self
    }

    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }
}

/// What the supervisor should do with a session on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    Healthy,
    /// Silent for a full interval: send an ActiveTest
    Probe,
    /// Too many probes went unanswered
    Unresponsive,
    /// Silent past the force-close time
    Idle,
}

/// Snapshot for logging and monitoring
#[derive(Debug, Clone)]
pub struct HeartbeatStatus {
    /// Probes sent since the last observed traffic
    pub missed: u32,
    pub total_probes: u64,
    pub idle_for: Duration,
}

#[derive(Debug)]
struct State {
    last_use: Instant,
    last_probe: Option<Instant>,
    missed: u32,
    total_probes: u64,
}

/// Liveness state of one session.
///
/// Shared between the reader task (which reports traffic) and the
/// supervisor (which sends probes), so every method takes `&self`.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Mutex<State>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                last_use: Instant::now(),
                last_probe: None,
                missed: 0,
                total_probes: 0,
            }),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Inbound traffic from the peer. Frames this side sends do not count,
    /// so a peer that never talks is still closed when idle.
    pub fn on_traffic(&self) {
        self.on_traffic_at(Instant::now());
    }

    pub fn on_traffic_at(&self, now: Instant) {
        let mut state = self.state.lock();
        state.last_use = now;
        state.missed = 0;
    }

    pub fn on_probe_sent(&self) {
        self.on_probe_sent_at(Instant::now());
    }

    pub fn on_probe_sent_at(&self, now: Instant) {
        let mut state = self.state.lock();
        state.last_probe = Some(now);
        state.missed += 1;
        state.total_probes += 1;
        debug!(missed = state.missed, "heartbeat probe sent");
    }

    pub fn needs_heartbeat(&self) -> bool {
        self.needs_heartbeat_at(Instant::now())
    }

    /// Silent for a full interval, and no probe went out within the last
    /// interval either
    pub fn needs_heartbeat_at(&self, now: Instant) -> bool {
        let state = self.state.lock();
        let silent = |since: Instant| now.saturating_duration_since(since) >= self.config.interval;
        silent(state.last_use) && state.last_probe.is_none_or(silent)
    }

    pub fn is_unresponsive(&self) -> bool {
        self.state.lock().missed >= self.config.max_missed
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle_at(Instant::now())
    }

    pub fn is_idle_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.state.lock().last_use) > self.config.force_close
    }

    pub fn last_use(&self) -> Instant {
        self.state.lock().last_use
    }

    pub fn missed(&self) -> u32 {
        self.state.lock().missed
    }

    /// Idle beats unresponsive beats probe-due
    pub fn verdict_at(&self, now: Instant) -> HeartbeatVerdict {
        if self.is_idle_at(now) {
            HeartbeatVerdict::Idle
        } else if self.is_unresponsive() {
            HeartbeatVerdict::Unresponsive
        } else if self.needs_heartbeat_at(now) {
            HeartbeatVerdict::Probe
        } else {
            HeartbeatVerdict::Healthy
        }
    }

    pub fn status(&self) -> HeartbeatStatus {
        let state = self.state.lock();
        HeartbeatStatus {
            missed: state.missed,
            total_probes: state.total_probes,
            idle_for: state.last_use.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_missed, 3);
        assert_eq!(config.force_close, Duration::from_secs(300));
    }

    #[test]
    fn probe_due_after_interval() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let start = monitor.last_use();
        assert!(!monitor.needs_heartbeat_at(start + Duration::from_secs(59)));
        assert!(monitor.needs_heartbeat_at(start + Duration::from_secs(60)));
        assert_eq!(monitor.verdict_at(start + Duration::from_secs(61)), HeartbeatVerdict::Probe);
    }

    #[test]
    fn one_probe_per_interval() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let start = monitor.last_use();
        let first = start + Duration::from_secs(60);
        monitor.on_probe_sent_at(first);

        assert!(!monitor.needs_heartbeat_at(first + Duration::from_secs(1)));
        assert!(monitor.needs_heartbeat_at(first + Duration::from_secs(60)));
    }

    #[test]
    fn three_unanswered_probes_are_unresponsive() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let start = monitor.last_use();

        monitor.on_probe_sent();
        monitor.on_probe_sent();
        assert!(!monitor.is_unresponsive());
        monitor.on_probe_sent();
        assert!(monitor.is_unresponsive());
        assert_eq!(monitor.verdict_at(start), HeartbeatVerdict::Unresponsive);
        assert_eq!(monitor.status().total_probes, 3);
    }

    #[test]
    fn traffic_resets_missed_probes() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        monitor.on_probe_sent();
        monitor.on_probe_sent();
        monitor.on_traffic();
        assert_eq!(monitor.missed(), 0);
        assert_eq!(monitor.status().total_probes, 2);
    }

    #[test]
    fn idle_wins_with_no_misses() {
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::default().with_force_close(Duration::from_secs(120)),
        );
        let start = monitor.last_use();
        assert_eq!(monitor.missed(), 0);
        assert!(!monitor.is_idle_at(start + Duration::from_secs(120)));
        assert_eq!(monitor.verdict_at(start + Duration::from_secs(121)), HeartbeatVerdict::Idle);
    }
}
