// ABOUTME: One logged-in client connection to an operator gateway, generic over the wire dialect
// ABOUTME: Owns the reader task, the shared writer, heartbeat state and the submits still awaiting a response

use crate::auth::ClientAuthRecord;
use crate::client::config::ClientConfig;
use crate::client::dialect::{ClientDialect, Inbound};
use crate::connection::{AtomicState, Connection, FrameReader, SessionState, SharedWriter};
use crate::datatypes::MtOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::flow_control::{Window, WindowPermit};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatVerdict};
use crate::sequence::Sequences;
use crate::tracking::Tracker;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `lru_priority` of a healthy session that sent nothing this period
pub const LRU_CEILING: u64 = 10_000_000_000;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct InFlight {
    _permit: WindowPermit,
    since: Instant,
}

/// A client session.
///
/// Created logged-in by [`Session::connect`]; a failed handshake never
/// yields a session, retrying is the factory's job. Inbound traffic is
/// handled by a background reader task that lives until the session
/// closes.
pub struct Session<P: ClientDialect> {
    id: u64,
    config: ClientConfig,
    peer: Option<SocketAddr>,
    version: u8,
    record: RwLock<Option<Arc<ClientAuthRecord>>>,
    state: AtomicState,
    writer: SharedWriter<P>,
    heartbeat: HeartbeatMonitor,
    seqs: Arc<Sequences>,
    tracker: Arc<Tracker>,
    window: Window,
    inflight: DashMap<String, InFlight>,
    counter: AtomicU64,
    period_counter: AtomicU64,
    created: Instant,
    cancel: CancellationToken,
}

impl<P: ClientDialect> fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("isp", &P::ISP)
            .field("peer", &self.peer)
            .field("state", &self.state.load())
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

impl<P: ClientDialect> Session<P> {
    /// Dial `addr`, log in and start the reader task.
    ///
    /// Each submit holds a slot of `window` until its response arrives.
    pub async fn connect(
        addr: &str,
        config: ClientConfig,
        record: Arc<ClientAuthRecord>,
        seqs: Arc<Sequences>,
        tracker: Arc<Tracker>,
        window: Window,
    ) -> GatewayResult<Arc<Self>> {
        let timeout = config.handshake_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr)).await??;
        let mut conn = Connection::<P>::new(stream);
        let peer = conn.peer_addr();

        let login = P::login_frame(&record, &seqs);
        conn.write_frame(&login).await?;
        let response = tokio::time::timeout(timeout, conn.read_frame(record.version))
            .await??
            .ok_or(GatewayError::ConnectionClosed)?;

        if let Err(err) = P::check_login_response(&response, &record) {
            warn!(isp = %P::ISP, client_id = %record.client_id, addr, error = %err, "login rejected");
            return Err(err);
        }

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!(session = id, isp = %P::ISP, client_id = %record.client_id, ?peer, "login succeeded");

        let (reader, writer) = conn.into_split();
        let session = Arc::new(Session {
            id,
            heartbeat: HeartbeatMonitor::new(config.heartbeat.clone()),
            config,
            peer,
            version: record.version,
            record: RwLock::new(Some(record)),
            state: AtomicState::new(SessionState::Connecting),
            writer: SharedWriter::new(writer),
            seqs,
            tracker,
            window,
            inflight: DashMap::new(),
            counter: AtomicU64::new(0),
            period_counter: AtomicU64::new(0),
            created: Instant::now(),
            cancel: CancellationToken::new(),
        });
        session.state.login();

        tokio::spawn(Arc::clone(&session).receive(reader));
        Ok(session)
    }

    /// Submit `content` to `phones`. Long content goes out as several
    /// segments; the printable sequence of each is returned.
    pub async fn send(
        &self,
        query_id: u64,
        phones: &[String],
        content: &str,
        options: &MtOptions,
    ) -> GatewayResult<Vec<String>> {
        let record = self.record()?;
        if self.state.load() != SessionState::LoggedIn {
            return Err(GatewayError::InvalidState(format!("session {} is not logged in", self.id)));
        }

        let frames = P::submits(&record, phones, content, options, &self.seqs)?;
        let label = phones.join(",");
        let mut sequences = Vec::with_capacity(frames.len());

        for (sequence, frame) in frames {
            let permit = tokio::time::timeout(self.config.response_timeout, self.window.acquire())
                .await
                .map_err(|_| GatewayError::FlowControl)?
                .ok_or(GatewayError::ConnectionClosed)?;
            self.inflight.insert(
                sequence.clone(),
                InFlight {
                    _permit: permit,
                    since: Instant::now(),
                },
            );
            self.tracker.track(query_id, &label, &sequence);

            if let Err(err) = self.writer.send(&frame).await {
                self.inflight.remove(&sequence);
                error!(session = self.id, seq = %sequence, error = %err, "submit write failed");
                self.close().await;
                return Err(err);
            }
            debug!(session = self.id, seq = %sequence, phones = %label, "submit sent");
            sequences.push(sequence);
        }

        self.add_counter(1);
        Ok(sequences)
    }

    async fn receive(self: Arc<Self>, mut reader: FrameReader<P>) {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = reader.read_frame(self.version) => frame,
            };

            match frame {
                Ok(Some(frame)) => {
                    self.heartbeat.on_traffic();
                    if !self.on_frame(frame).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!(session = self.id, isp = %P::ISP, "connection closed by peer");
                    break;
                }
                Err(err) if err.is_body_error() => {
                    error!(session = self.id, isp = %P::ISP, error = %err, "dropping undecodable packet");
                }
                Err(err) => {
                    error!(session = self.id, isp = %P::ISP, error = %err, "read failed, closing session");
                    break;
                }
            }
        }
        self.close().await;
    }

    /// Returns false once the session should stop reading
    async fn on_frame(&self, frame: P::Frame) -> bool {
        match P::classify(&frame) {
            Inbound::Heartbeat { reply } => self.reply(&reply).await,
            Inbound::HeartbeatAck => true,
            Inbound::Terminate { reply } => {
                info!(session = self.id, isp = %P::ISP, "terminate requested by gateway");
                let _ = self.writer.send(&reply).await;
                false
            }
            Inbound::TerminateAck => false,
            Inbound::SubmitResp { sequence, result, msg_id } => {
                self.inflight.remove(&sequence);
                if result != 0 {
                    warn!(session = self.id, seq = %sequence, status = result, "submit rejected");
                }
                self.tracker.on_response(&sequence, result, msg_id);
                true
            }
            Inbound::Report { reply, msg_id, stat } => {
                debug!(session = self.id, msg_id = %msg_id, stat = %stat, "status report");
                self.tracker.on_report(&msg_id, &stat);
                self.reply(&reply).await
            }
            Inbound::MoMessage { reply, from, to, text } => {
                info!(session = self.id, from = %from, to = %to, text = %text, "mobile originated message");
                self.reply(&reply).await
            }
            Inbound::Ignored => {
                debug!(
                    session = self.id,
                    command_id = format_args!("{:#x}", P::command_of(&frame)),
                    "ignoring frame"
                );
                true
            }
        }
    }

    async fn reply(&self, frame: &P::Frame) -> bool {
        match self.writer.send(frame).await {
            Ok(()) => true,
            Err(err) => {
                error!(session = self.id, error = %err, "reply write failed");
                false
            }
        }
    }

    pub fn health(&self) -> bool {
        self.state.load() == SessionState::LoggedIn && !self.cancel.is_cancelled()
    }

    /// Higher for less-used sessions; 0 for unhealthy ones
    pub fn lru_priority(&self) -> u64 {
        if !self.health() {
            return 0;
        }
        LRU_CEILING.saturating_sub(self.period_counter.load(Ordering::Relaxed))
    }

    pub fn add_counter(&self, n: u64) {
        self.counter.fetch_add(n, Ordering::Relaxed);
        self.period_counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reset_counter(&self) {
        self.period_counter.store(0, Ordering::Relaxed);
    }

    /// Periodic maintenance: frees window slots of submits that never got a
    /// response, closes the session when the gateway went quiet past the
    /// force-close time or left too many probes unanswered, and probes it
    /// after an idle interval. Returns the health afterwards.
    pub async fn health_check(&self) -> bool {
        if !self.health() {
            return false;
        }

        let timeout = self.config.response_timeout;
        self.inflight.retain(|_, entry| entry.since.elapsed() < timeout);

        match self.heartbeat.verdict_at(Instant::now()) {
            HeartbeatVerdict::Healthy => true,
            HeartbeatVerdict::Idle => {
                warn!(
                    session = self.id,
                    isp = %P::ISP,
                    idle_for = ?self.heartbeat.last_use().elapsed(),
                    "gateway idle, closing session"
                );
                self.terminate().await;
                false
            }
            HeartbeatVerdict::Unresponsive => {
                warn!(
                    session = self.id,
                    isp = %P::ISP,
                    missed = self.heartbeat.missed(),
                    "heartbeat unanswered, closing session"
                );
                self.close().await;
                false
            }
            HeartbeatVerdict::Probe => {
                let Some(probe) = P::active_test(&self.seqs) else {
                    return true;
                };
                if let Err(err) = self.writer.send(&probe).await {
                    warn!(session = self.id, error = %err, "heartbeat write failed");
                    self.close().await;
                    return false;
                }
                self.heartbeat.on_probe_sent();
                true
            }
        }
    }

    /// Ask the gateway to end the session, wait up to the close grace for
    /// its acknowledgement, then close.
    pub async fn terminate(&self) {
        if self.health() && self.writer.send(&P::terminate(&self.seqs)).await.is_ok() {
            let grace = self.config.heartbeat.close_grace;
            let _ = tokio::time::timeout(grace, self.cancel.cancelled()).await;
        }
        self.close().await;
    }

    /// Stop the reader, close the socket and release window slots. Safe to
    /// call more than once.
    pub async fn close(&self) {
        if !self.state.begin_close() {
            return;
        }
        self.cancel.cancel();
        self.writer.shutdown().await;
        self.inflight.clear();
        self.record.write().take();
        info!(
            session = self.id,
            isp = %P::ISP,
            sent = self.counter.load(Ordering::Relaxed),
            "session closed"
        );
    }

    fn record(&self) -> GatewayResult<Arc<ClientAuthRecord>> {
        self.record
            .read()
            .clone()
            .ok_or_else(|| GatewayError::InvalidState(format!("session {} is closed", self.id)))
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

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Submits written but not yet answered
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn period_counter(&self) -> u64 {
        self.period_counter.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> std::time::Duration {
        self.created.elapsed()
    }
}
