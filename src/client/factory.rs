// ABOUTME: Per-ISP pool of client sessions sharing one rate limiter and one in-flight window
// ABOUTME: Least-recently-used selection over a copy-on-rebuild list, refreshed by a periodic re-sort task

use crate::auth::ClientAuthRecord;
use crate::client::config::FactoryConfig;
use crate::client::dialect::ClientDialect;
use crate::client::session::Session;
use crate::datatypes::MtOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::flow_control::{RateLimiter, Window};
use crate::sequence::Sequences;
use crate::tracking::Tracker;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SessionList<P> = Arc<Vec<Arc<Session<P>>>>;

/// Sessions to one operator account.
///
/// Readers take a snapshot of the session list and never block the
/// re-sort task, which builds a new list and swaps it in.
#[derive(Debug)]
pub struct SessionFactory<P: ClientDialect> {
    config: FactoryConfig,
    record: Arc<ClientAuthRecord>,
    seqs: Arc<Sequences>,
    tracker: Arc<Tracker>,
    sessions: RwLock<SessionList<P>>,
    rebuild: tokio::sync::Mutex<()>,
    limiter: RateLimiter,
    window: Window,
    cancel: CancellationToken,
}

impl<P: ClientDialect> SessionFactory<P> {
    pub fn new(
        config: FactoryConfig,
        record: Arc<ClientAuthRecord>,
        seqs: Arc<Sequences>,
        tracker: Arc<Tracker>,
    ) -> Self {
        let window = u32::from(record.mt_window_size);
        Self {
            limiter: RateLimiter::new(record.throughput, window),
            window: Window::new(window as usize),
            config,
            record,
            seqs,
            tracker,
            sessions: RwLock::new(Arc::new(Vec::new())),
            rebuild: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn record(&self) -> &Arc<ClientAuthRecord> {
        &self.record
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Current session list
    pub fn sessions(&self) -> SessionList<P> {
        self.sessions.read().clone()
    }

    /// The healthy session used least since the last re-sort
    pub fn peek(&self) -> Option<Arc<Session<P>>> {
        self.sessions()
            .iter()
            .filter(|session| session.health())
            .max_by_key(|session| session.lru_priority())
            .cloned()
    }

    /// Submit through the least-used session.
    ///
    /// Fails fast with [`GatewayError::FlowControl`] when the rate limiter
    /// denies the call and [`GatewayError::PoolExhausted`] when no session
    /// is up; both are transient and the caller retries.
    pub async fn send(
        &self,
        query_id: u64,
        phones: &[String],
        content: &str,
        options: &MtOptions,
    ) -> GatewayResult<Vec<String>> {
        if !self.limiter.allow() {
            return Err(GatewayError::FlowControl);
        }
        let session = self.peek().ok_or(GatewayError::PoolExhausted)?;
        session.send(query_id, phones, content, options).await
    }

    /// One maintenance pass: health-check every session, drop the dead
    /// ones, re-order by LRU priority, reset period counters and open at
    /// most one new connection when below `max_conns`.
    pub async fn resort(&self) {
        let _guard = self.rebuild.lock().await;
        let current = self.sessions();

        let mut alive = Vec::with_capacity(current.len() + 1);
        for session in current.iter() {
            if session.health_check().await {
                alive.push(Arc::clone(session));
            } else {
                info!(session = session.id(), isp = %P::ISP, client_id = %self.record.client_id, "evicting session");
                session.close().await;
            }
        }

        alive.sort_by_key(|session| Reverse(session.lru_priority()));
        for session in &alive {
            session.reset_counter();
        }

        if alive.len() < usize::from(self.record.max_conns) && !self.cancel.is_cancelled() {
            match self.connect().await {
                Ok(session) => alive.push(session),
                Err(err) => warn!(
                    isp = %P::ISP,
                    client_id = %self.record.client_id,
                    addr = %self.config.addr,
                    error = %err,
                    "connect failed"
                ),
            }
        }

        debug!(isp = %P::ISP, sessions = alive.len(), "session list rebuilt");
        *self.sessions.write() = Arc::new(alive);
    }

    async fn connect(&self) -> GatewayResult<Arc<Session<P>>> {
        Session::connect(
            &self.config.addr,
            self.config.client.clone(),
            Arc::clone(&self.record),
            Arc::clone(&self.seqs),
            Arc::clone(&self.tracker),
            self.window.clone(),
        )
        .await
    }

    /// Re-sort every `resort_interval` until [`SessionFactory::close`].
    /// The first pass runs immediately.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.resort_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.resort().await,
            }
        }
        debug!(isp = %P::ISP, client_id = %self.record.client_id, "re-sort task stopped");
    }

    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Stop the re-sort task and terminate every session
    pub async fn close(&self) {
        self.cancel.cancel();
        let _guard = self.rebuild.lock().await;
        let sessions = std::mem::take(&mut *self.sessions.write());
        for session in sessions.iter() {
            session.terminate().await;
        }
        self.window.close();
        info!(isp = %P::ISP, client_id = %self.record.client_id, "factory closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
