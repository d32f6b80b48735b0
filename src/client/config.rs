// ABOUTME: Configuration for client sessions, per-ISP session factories and the routing gateway
// ABOUTME: Plain structs with defaults and with_* builders; loading them from files is left to the caller

use crate::auth::Isp;
use crate::heartbeat::HeartbeatConfig;
use crate::sequence::SequenceConfig;
use std::time::Duration;

/// Settings for one client session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Dial plus login exchange (default: 5 seconds)
    pub handshake_timeout: Duration,

    /// A submit without a response after this long gives its window slot
    /// back (default: 30 seconds)
    pub response_timeout: Duration,

    pub heartbeat: HeartbeatConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// One operator link: where to dial, which account to use and which phone
/// numbers it serves. Throughput, window and connection count come from
/// the account's auth record.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub isp: Isp,
    pub client_id: String,
    pub addr: String,

    /// Number-segment regex, e.g. `^1(3[4-9]|5[0-27-9])`
    pub segment: String,

    /// Pool maintenance period (default: 1 second)
    pub resort_interval: Duration,

    pub client: ClientConfig,
}

impl FactoryConfig {
    pub fn new(isp: Isp, client_id: impl Into<String>, addr: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            isp,
            client_id: client_id.into(),
            addr: addr.into(),
            segment: segment.into(),
            resort_interval: Duration::from_secs(1),
            client: ClientConfig::default(),
        }
    }

    pub fn with_resort_interval(mut self, interval: Duration) -> Self {
        self.resort_interval = interval;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}

/// Settings shared by all factories of a gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Lifetime of tracked results (default: 60 seconds)
    pub tracking_ttl: Duration,

    /// Expiry sweep period (default: 1 second)
    pub sweep_interval: Duration,

    /// How long `send` keeps retrying through back-pressure (default: 10 seconds)
    pub send_timeout: Duration,

    /// Pause between retries (default: 1 millisecond)
    pub retry_interval: Duration,

    pub sequences: SequenceConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tracking_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(1),
            send_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(1),
            sequences: SequenceConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn with_tracking_ttl(mut self, ttl: Duration) -> Self {
        self.tracking_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_sequences(mut self, sequences: SequenceConfig) -> Self {
        self.sequences = sequences;
        self
    }
}
