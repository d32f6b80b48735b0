// ABOUTME: Server-side view of one accepted connection: state, counters and per-session flow control
// ABOUTME: Flow-control resources exist only between a successful login and close

use crate::auth::ClientAuthRecord;
use crate::connection::{AtomicState, SessionState, SharedWriter};
use crate::error::{GatewayError, GatewayResult};
use crate::flow_control::{RateLimiter, Window, WorkerPool};
use crate::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use crate::protocol::Protocol;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-session flow control handed out at login
#[derive(Debug, Clone)]
pub struct SessionResources {
    pub window: Window,
    pub pool: WorkerPool,
    pub limiter: Arc<RateLimiter>,
}

impl SessionResources {
    /// Window of `mt_window_size`, twice as many workers, and a limiter at
    /// the account's throughput with a burst of one window
    pub fn for_record(record: &ClientAuthRecord) -> Self {
        let window = usize::from(record.mt_window_size.max(1));
        Self {
            window: Window::new(window),
            pool: WorkerPool::new(window * 2),
            limiter: Arc::new(RateLimiter::new(record.throughput, window as u32)),
        }
    }

    fn release(&self) {
        self.window.close();
        self.pool.close();
    }
}

/// Traffic counters
#[derive(Debug, Default)]
pub struct Counters {
    /// Submits answered
    pub mt: AtomicU64,
    /// MO messages delivered
    pub mo: AtomicU64,
    /// Status reports delivered
    pub report: AtomicU64,
}

/// An accepted connection
pub struct ServerSession<P: Protocol> {
    id: u64,
    peer: Option<SocketAddr>,
    created: Instant,
    state: AtomicState,
    version: AtomicU8,
    client: RwLock<Option<Arc<ClientAuthRecord>>>,
    writer: SharedWriter<P>,
    heartbeat: HeartbeatMonitor,
    resources: Mutex<Option<SessionResources>>,
    counters: Counters,
    terminating: AtomicBool,
    cancel: CancellationToken,
}

impl<P: Protocol> fmt::Debug for ServerSession<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSession")
            .field("id", &self.id)
            .field("isp", &P::ISP)
            .field("peer", &self.peer)
            .field("client_id", &self.client_id())
            .field("state", &self.state.load())
            .finish()
    }
}

impl<P: Protocol> ServerSession<P> {
    pub fn new(id: u64, peer: Option<SocketAddr>, writer: SharedWriter<P>, heartbeat: HeartbeatConfig) -> Self {
        Self {
            id,
            peer,
            created: Instant::now(),
            state: AtomicState::new(SessionState::Connecting),
            version: AtomicU8::new(0),
            client: RwLock::new(None),
            writer,
            heartbeat: HeartbeatMonitor::new(heartbeat),
            resources: Mutex::new(None),
            counters: Counters::default(),
            terminating: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Switch to `LoggedIn` with the account's version and flow control.
    /// False when the session closed in the meantime.
    pub fn complete_login(&self, record: Arc<ClientAuthRecord>, version: u8) -> bool {
        let resources = SessionResources::for_record(&record);
        self.version.store(version, Ordering::Release);
        *self.client.write() = Some(record);
        *self.resources.lock() = Some(resources);
        self.heartbeat.on_traffic();

        if self.state.login() {
            return true;
        }
        // Lost a race with close
        if let Some(resources) = self.resources.lock().take() {
            resources.release();
        }
        self.client.write().take();
        false
    }

    pub async fn send(&self, frame: &P::Frame) -> GatewayResult<()> {
        self.writer.send(frame).await
    }

    /// Close now. Safe to call more than once and while handlers still hold
    /// window slots.
    pub async fn close(&self) {
        if !self.state.begin_close() {
            return;
        }
        self.cancel.cancel();
        if let Some(resources) = self.resources.lock().take() {
            resources.release();
        }
        self.writer.shutdown().await;
        let client = self.client.write().take();
        info!(
            session = self.id,
            isp = %P::ISP,
            client_id = client.as_ref().map_or("-", |record| record.client_id.as_str()),
            mt = self.counters.mt.load(Ordering::Relaxed),
            mo = self.counters.mo.load(Ordering::Relaxed),
            report = self.counters.report.load(Ordering::Relaxed),
            "session closed"
        );
    }

    /// Send `frame` (a terminate request), give the peer `grace` to hang up,
    /// then close. Only the first call does anything.
    pub async fn terminate(&self, frame: &P::Frame, grace: Duration) {
        if self.terminating.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.send(frame).await.is_ok() {
            let _ = tokio::time::timeout(grace, self.cancel.cancelled()).await;
        }
        self.close().await;
    }

    /// Resources of a logged-in session
    pub fn resources(&self) -> GatewayResult<SessionResources> {
        self.resources
            .lock()
            .clone()
            .ok_or_else(|| GatewayError::InvalidState(format!("session {} is not logged in", self.id)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.load() == SessionState::LoggedIn
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u8 {
        self.version.load(Ordering::Acquire)
    }

    pub fn client(&self) -> Option<Arc<ClientAuthRecord>> {
        self.client.read().clone()
    }

    pub fn client_id(&self) -> Option<String> {
        self.client.read().as_ref().map(|record| record.client_id.clone())
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
