// ABOUTME: Server listener settings and the simulated-gateway behaviour used by the mock server
// ABOUTME: Plain structs with defaults and with_* builders, like the client configuration

use crate::heartbeat::HeartbeatConfig;
use crate::sequence::SequenceConfig;
use rand::Rng;
use std::time::Duration;

/// Settings for one protocol listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:7890`
    pub addr: String,

    /// Connections beyond this are refused before any handshake
    /// (default: 1024)
    pub max_sessions: usize,

    /// Supervisor period (default: 1 second)
    pub tick_interval: Duration,

    /// Workers shared by login handling and supervisor jobs
    /// (default: number of CPUs)
    pub login_workers: usize,

    pub heartbeat: HeartbeatConfig,
    pub sequences: SequenceConfig,
    pub mock: MockConfig,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_sessions: 1024,
            tick_interval: Duration::from_secs(1),
            login_workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            heartbeat: HeartbeatConfig::default(),
            sequences: SequenceConfig::default(),
            mock: MockConfig::default(),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_login_workers(mut self, workers: usize) -> Self {
        self.login_workers = workers;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_sequences(mut self, sequences: SequenceConfig) -> Self {
        self.sequences = sequences;
        self
    }

    pub fn with_mock(mut self, mock: MockConfig) -> Self {
        self.mock = mock;
        self
    }
}

/// How the server pretends to be an operator gateway.
///
/// Probabilities are in `[0, 1]`. The defaults answer every submit
/// successfully, immediately, with a status report and no MO traffic.
///
/// ```rust
/// use smsgate::server::MockConfig;
/// use std::time::Duration;
///
/// let mock = MockConfig::default()
///     .with_success_rate(0.95)
///     .with_response_delay(Duration::from_millis(5), Duration::from_millis(20))
///     .with_mo(0.1, vec!["01_,_TD".to_string()]);
/// assert_eq!(mock.mo_contents.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Share of submits answered with status 0
    pub success_rate: f64,

    pub min_response_delay: Duration,
    pub max_response_delay: Duration,

    /// Share of successful submits that get a status report
    pub report_rate: f64,

    /// Pause between the submit response and its report
    pub report_delay: Duration,

    /// Emit simulated mobile-originated messages from the supervisor
    pub mo_enabled: bool,

    /// Chance per session and tick of one MO message
    pub mo_rate: f64,

    /// `sub_no_,_text` entries to pick MO messages from
    pub mo_contents: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            min_response_delay: Duration::ZERO,
            max_response_delay: Duration::ZERO,
            report_rate: 1.0,
            report_delay: Duration::ZERO,
            mo_enabled: false,
            mo_rate: 0.0,
            mo_contents: Vec::new(),
        }
    }
}

impl MockConfig {
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate;
        self
    }

    pub fn with_response_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_response_delay = min;
        self.max_response_delay = max.max(min);
        self
    }

    pub fn with_report(mut self, rate: f64, delay: Duration) -> Self {
        self.report_rate = rate;
        self.report_delay = delay;
        self
    }

    pub fn with_mo(mut self, rate: f64, contents: Vec<String>) -> Self {
        self.mo_enabled = true;
        self.mo_rate = rate;
        self.mo_contents = contents;
        self
    }

    /// Processing time for one submit, uniform over the configured range
    pub fn response_delay(&self) -> Duration {
        if self.min_response_delay >= self.max_response_delay {
            return self.min_response_delay;
        }
        rand::thread_rng().gen_range(self.min_response_delay..=self.max_response_delay)
    }

    pub fn submit_succeeds(&self) -> bool {
        roll(self.success_rate)
    }

    pub fn report_wanted(&self) -> bool {
        roll(self.report_rate)
    }

    /// A random MO entry split into sub number and text, when one is due
    pub fn next_mo(&self) -> Option<(String, String)> {
        if !self.mo_enabled || self.mo_contents.is_empty() || !roll(self.mo_rate) {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.mo_contents.len());
        split_mo(&self.mo_contents[index])
    }
}

/// True with probability `rate`
fn roll(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(rate)
}

fn split_mo(entry: &str) -> Option<(String, String)> {
    let (sub_no, text) = entry.split_once("_,_")?;
    Some((sub_no.to_string(), text.to_string()))
}
