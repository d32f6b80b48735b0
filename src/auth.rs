// ABOUTME: Client authentication records and the lookup collaborator consulted during login
// ABOUTME: Provides the AuthStore trait plus an in-memory store keyed by isp and client id

use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Operator protocol identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isp {
    Cmpp,
    Sgip,
    Smgp,
}

impl Isp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Isp::Cmpp => "cmpp",
            Isp::Sgip => "sgip",
            Isp::Smgp => "smgp",
        }
    }
}

impl fmt::Display for Isp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Isp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cmpp" => Ok(Isp::Cmpp),
            "sgip" => Ok(Isp::Sgip),
            "smgp" => Ok(Isp::Smgp),
            other => Err(format!("unknown isp: {other}")),
        }
    }
}

/// Credentials and submit defaults for one gateway account.
///
/// Records are immutable once loaded and shared by reference between
/// sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientAuthRecord {
    pub isp: Isp,
    pub client_id: String,
    pub shared_secret: String,
    /// Protocol version byte (0x30 for CMPP3, 0x12 for SGIP, ...)
    pub version: u8,
    /// Default registered-delivery flag
    pub need_report: u8,
    /// SP access number shown as the sender
    pub sms_display_no: String,
    pub service_id: String,
    pub default_msg_level: u8,
    pub fee_user_type: u8,
    pub fee_terminal_type: u8,
    pub fee_terminal_id: String,
    pub fee_type: String,
    pub fee_code: String,
    pub fixed_fee: String,
    pub link_id: String,
    /// How long a submitted message stays valid at the SMSC
    pub mt_valid_duration: Duration,
    pub max_conns: u16,
    /// Receive window (concurrent in-flight submits)
    pub mt_window_size: u16,
    /// Messages per second
    pub throughput: u32,
}

impl ClientAuthRecord {
    pub fn new(
        isp: Isp,
        client_id: impl Into<String>,
        shared_secret: impl Into<String>,
        version: u8,
    ) -> Self {
        Self {
            isp,
            client_id: client_id.into(),
            shared_secret: shared_secret.into(),
            version,
            need_report: 1,
            sms_display_no: String::new(),
            service_id: String::new(),
            default_msg_level: 0,
            fee_user_type: 2,
            fee_terminal_type: 0,
            fee_terminal_id: String::new(),
            fee_type: "02".to_string(),
            fee_code: "0".to_string(),
            fixed_fee: "0".to_string(),
            link_id: String::new(),
            mt_valid_duration: Duration::from_secs(2 * 60 * 60),
            max_conns: 2,
            mt_window_size: 16,
            throughput: 100,
        }
    }

    pub fn with_display_no(mut self, display_no: impl Into<String>) -> Self {
        self.sms_display_no = display_no.into();
        self
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_need_report(mut self, need_report: u8) -> Self {
        self.need_report = need_report;
        self
    }

    pub fn with_max_conns(mut self, max_conns: u16) -> Self {
        self.max_conns = max_conns;
        self
    }

    pub fn with_window(mut self, mt_window_size: u16) -> Self {
        self.mt_window_size = mt_window_size;
        self
    }

    pub fn with_throughput(mut self, throughput: u32) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn with_valid_duration(mut self, duration: Duration) -> Self {
        self.mt_valid_duration = duration;
        self
    }

    /// Store key: lowercase `isp_clientid`
    pub fn key(&self) -> String {
        store_key(self.isp, &self.client_id)
    }
}

fn store_key(isp: Isp, client_id: &str) -> String {
    format!("{}_{}", isp, client_id).to_lowercase()
}

/// Lookup collaborator consulted during handshakes.
///
/// A missing record fails the handshake with the dialect's
/// unknown-client status; it never aborts the connection task.
pub trait AuthStore: Send + Sync {
    fn find(&self, isp: Isp, client_id: &str) -> Option<Arc<ClientAuthRecord>>;
}

/// Process-local store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    records: DashMap<String, Arc<ClientAuthRecord>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ClientAuthRecord) -> Arc<ClientAuthRecord> {
        let record = Arc::new(record);
        self.records.insert(record.key(), Arc::clone(&record));
        record
    }

    pub fn remove(&self, isp: Isp, client_id: &str) -> Option<Arc<ClientAuthRecord>> {
        self.records
            .remove(&store_key(isp, client_id))
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ClientAuthRecord> for MemoryAuthStore {
    fn from_iter<I: IntoIterator<Item = ClientAuthRecord>>(iter: I) -> Self {
        let store = MemoryAuthStore::new();
        for record in iter {
            store.insert(record);
        }
        store
    }
}

impl AuthStore for MemoryAuthStore {
    fn find(&self, isp: Isp, client_id: &str) -> Option<Arc<ClientAuthRecord>> {
        self.records
            .get(&store_key(isp, client_id))
            .map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_on_the_key() {
        let store = MemoryAuthStore::new();
        store.insert(ClientAuthRecord::new(Isp::Cmpp, "SP0001", "secret", 0x30));

        assert!(store.find(Isp::Cmpp, "sp0001").is_some());
        assert!(store.find(Isp::Cmpp, "SP0001").is_some());
        assert!(store.find(Isp::Smgp, "SP0001").is_none());
        assert!(store.find(Isp::Cmpp, "missing").is_none());
    }

    #[test]
    fn isp_parses_from_config_names() {
        assert_eq!("CMPP".parse::<Isp>().unwrap(), Isp::Cmpp);
        assert_eq!("smgp".parse::<Isp>().unwrap(), Isp::Smgp);
        assert!("smpp".parse::<Isp>().is_err());
    }

    #[test]
    fn builder_overrides_defaults() {
        let record = ClientAuthRecord::new(Isp::Sgip, "3053112345", "pwd", 0x12)
            .with_display_no("1065")
            .with_window(32)
            .with_throughput(500);
        assert_eq!(record.sms_display_no, "1065");
        assert_eq!(record.mt_window_size, 32);
        assert_eq!(record.throughput, 500);
        assert_eq!(record.max_conns, 2);
    }
}
