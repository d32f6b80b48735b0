// ABOUTME: Correlates submits with their responses and status reports across sessions
// ABOUTME: Concurrent seq/msg-id/query-id maps with a TTL sweep that hands expired results to a sink

use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Largest batch handed to [`ResultSink::append`] in one call
pub const SWEEP_BATCH: usize = 64;

/// Outcome of one submitted segment
#[derive(Debug, Clone, PartialEq)]
pub struct SendResult {
    pub query_id: u64,
    pub phone: String,
    /// Decimal sequence id, or the SGIP triple
    pub sequence: String,
    /// Gateway response code; `None` until the response arrives
    pub result: Option<u32>,
    /// Gateway message id used to match the status report
    pub msg_id: Option<String>,
    /// 7-character report token (`DELIVRD`, `UNDELIV`, ...)
    pub report: Option<String>,
    pub send_time: DateTime<Local>,
    pub response_time: Option<DateTime<Local>>,
    pub report_time: Option<DateTime<Local>>,
}

impl SendResult {
    pub fn new(query_id: u64, phone: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            query_id,
            phone: phone.into(),
            sequence: sequence.into(),
            result: None,
            msg_id: None,
            report: None,
            send_time: Local::now(),
            response_time: None,
            report_time: None,
        }
    }
}

/// Persistence collaborator for expired results. Called from the sweep;
/// failures are logged and never reach the send path.
pub trait ResultSink: Send + Sync {
    fn append(&self, batch: Vec<SendResult>) -> Result<(), crate::Error>;
}

/// Drops everything
#[derive(Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn append(&self, _batch: Vec<SendResult>) -> Result<(), crate::Error> {
        Ok(())
    }
}

/// Keeps every appended batch, mostly for tests and demos
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<SendResult>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<SendResult>> {
        self.batches.lock().clone()
    }

    pub fn total(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

impl ResultSink for MemorySink {
    fn append(&self, batch: Vec<SendResult>) -> Result<(), crate::Error> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

#[derive(Debug)]
struct Entry {
    created: Instant,
    result: Mutex<SendResult>,
}

type Shared = Arc<Entry>;

/// In-memory correlation maps.
///
/// One entry is shared by all three indexes; entries leave the maps only
/// through [`Tracker::sweep`].
#[derive(Debug, Default)]
pub struct Tracker {
    by_seq: DashMap<String, Shared>,
    by_msg_id: DashMap<String, Shared>,
    by_query: DashMap<u64, (Instant, Vec<Shared>)>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a segment just written to the wire
    pub fn track(&self, query_id: u64, phone: &str, sequence: &str) {
        self.track_at(Instant::now(), query_id, phone, sequence);
    }

    pub fn track_at(&self, now: Instant, query_id: u64, phone: &str, sequence: &str) {
        let entry = Arc::new(Entry {
            created: now,
            result: Mutex::new(SendResult::new(query_id, phone, sequence)),
        });
        self.by_seq.insert(sequence.to_string(), entry.clone());
        self.by_query
            .entry(query_id)
            .or_insert_with(|| (now, Vec::new()))
            .1
            .push(entry);
    }

    /// Apply a submit response. Returns false for unknown sequences.
    pub fn on_response(&self, sequence: &str, result: u32, msg_id: Option<String>) -> bool {
        let Some(entry) = self.by_seq.get(sequence).map(|e| e.value().clone()) else {
            debug!(seq = sequence, "response for untracked sequence");
            return false;
        };

        {
            let mut record = entry.result.lock();
            record.result = Some(result);
            record.response_time = Some(Local::now());
            record.msg_id = msg_id.clone();
        }
        if let Some(msg_id) = msg_id {
            self.by_msg_id.insert(msg_id, entry);
        }
        true
    }

    /// Apply a status report. Returns false for unknown message ids.
    pub fn on_report(&self, msg_id: &str, stat: &str) -> bool {
        let Some(entry) = self.by_msg_id.get(msg_id).map(|e| e.value().clone()) else {
            debug!(msg_id, "report for untracked message");
            return false;
        };

        let mut record = entry.result.lock();
        record.report = Some(stat.to_string());
        record.report_time = Some(Local::now());
        true
    }

    pub fn query(&self, query_id: u64) -> Option<Vec<SendResult>> {
        self.by_query
            .get(&query_id)
            .map(|entry| entry.1.iter().map(|e| e.result.lock().clone()).collect())
    }

    pub fn by_sequence(&self, sequence: &str) -> Option<SendResult> {
        self.by_seq.get(sequence).map(|e| e.result.lock().clone())
    }

    pub fn by_msg_id(&self, msg_id: &str) -> Option<SendResult> {
        self.by_msg_id.get(msg_id).map(|e| e.result.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }

    pub fn sweep(&self, ttl: Duration, sink: &dyn ResultSink) -> usize {
        self.sweep_at(Instant::now(), ttl, sink)
    }

    /// Drop entries older than `ttl` and hand expired query groups to
    /// `sink` in batches of at most [`SWEEP_BATCH`]. A group expires with
    /// its first send. Returns the number of results handed over.
    pub fn sweep_at(&self, now: Instant, ttl: Duration, sink: &dyn ResultSink) -> usize {
        let expired = |created: Instant| now.saturating_duration_since(created) > ttl;

        let query_ids: Vec<u64> = self
            .by_query
            .iter()
            .filter(|entry| expired(entry.value().0))
            .map(|entry| *entry.key())
            .collect();

        let mut handed = 0;
        let mut batch = Vec::with_capacity(SWEEP_BATCH);
        for query_id in query_ids {
            let Some((_, (_, entries))) = self.by_query.remove(&query_id) else {
                continue;
            };
            for entry in entries {
                batch.push(entry.result.lock().clone());
                if batch.len() == SWEEP_BATCH {
                    handed += flush(sink, std::mem::take(&mut batch));
                }
            }
        }
        if !batch.is_empty() {
            handed += flush(sink, batch);
        }

        self.by_seq.retain(|_, entry| !expired(entry.created));
        self.by_msg_id.retain(|_, entry| !expired(entry.created));
        handed
    }
}

fn flush(sink: &dyn ResultSink, batch: Vec<SendResult>) -> usize {
    let len = batch.len();
    if let Err(err) = sink.append(batch) {
        error!(error = %err, len, "result sink append failed");
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn append(&self, _batch: Vec<SendResult>) -> Result<(), crate::Error> {
            Err("disk full".into())
        }
    }

    #[test]
    fn response_then_report_updates_the_same_record() {
        let tracker = Tracker::new();
        tracker.track(9, "13800138000", "101");
        tracker.track(9, "13800138000", "102");

        assert!(tracker.on_response("101", 0, Some("00000000000000ab".into())));
        assert!(tracker.on_report("00000000000000ab", "DELIVRD"));
        assert!(!tracker.on_report("ffff", "DELIVRD"));
        assert!(!tracker.on_response("999", 0, None));

        let results = tracker.query(9).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result, Some(0));
        assert_eq!(results[0].report.as_deref(), Some("DELIVRD"));
        assert!(results[0].report_time.is_some());
        assert_eq!(results[1].result, None);
        assert_eq!(results[0].query_id, 9);
    }

    #[test]
    fn sweep_removes_only_after_ttl() {
        let tracker = Tracker::new();
        let sink = MemorySink::new();
        let start = Instant::now();
        let ttl = Duration::from_secs(60);
        tracker.track_at(start, 1, "13800138000", "1");
        tracker.on_response("1", 0, Some("m1".into()));

        assert_eq!(tracker.sweep_at(start + ttl, ttl, &sink), 0);
        assert!(tracker.query(1).is_some());
        assert!(tracker.by_msg_id("m1").is_some());

        assert_eq!(tracker.sweep_at(start + ttl + Duration::from_millis(1), ttl, &sink), 1);
        assert!(tracker.query(1).is_none());
        assert!(tracker.by_sequence("1").is_none());
        assert!(tracker.by_msg_id("m1").is_none());
        assert_eq!(sink.total(), 1);
    }

    #[test]
    fn sweep_batches_at_most_sixty_four() {
        let tracker = Tracker::new();
        let sink = MemorySink::new();
        let start = Instant::now();
        for i in 0..130 {
            tracker.track_at(start, 7, "13800138000", &i.to_string());
        }

        let handed = tracker.sweep_at(start + Duration::from_secs(2), Duration::from_secs(1), &sink);
        assert_eq!(handed, 130);
        let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![64, 64, 2]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn sink_failure_does_not_stop_the_sweep() {
        let tracker = Tracker::new();
        let start = Instant::now();
        tracker.track_at(start, 3, "13800138000", "5");
        tracker.sweep_at(start + Duration::from_secs(5), Duration::from_secs(1), &FailingSink);
        assert!(tracker.is_empty());
        assert!(tracker.query(3).is_none());
    }
}
