// ABOUTME: Periodic supervisor walking every server session: idle and dead-peer closes, probes, simulated MO
// ABOUTME: Slow work (terminate with grace period, writes) is spawned so one stuck peer never delays the tick

use crate::server::ServerContext;
use crate::server::dialect::ServerDialect;
use crate::server::session::ServerSession;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Run [`tick`] every `tick_interval` until the server stops
pub(crate) async fn supervise<P: ServerDialect>(cx: Arc<ServerContext<P>>) {
    let mut ticker = tokio::time::interval(cx.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cx.cancel.cancelled() => break,
            _ = ticker.tick() => tick(&cx),
        }
    }
}

/// One pass over the registry
pub(crate) fn tick<P: ServerDialect>(cx: &Arc<ServerContext<P>>) {
    for session in cx.registry.snapshot() {
        if session.is_closed() {
            cx.registry.remove(session.id());
            continue;
        }
        if session.is_terminating() {
            continue;
        }

        let heartbeat = session.heartbeat();
        if heartbeat.is_idle() {
            warn!(session = session.id(), client_id = ?session.client_id(), "idle session, terminating");
            terminate(cx, &session);
            continue;
        }
        if heartbeat.is_unresponsive() {
            warn!(
                session = session.id(),
                client_id = ?session.client_id(),
                missed = heartbeat.missed(),
                "peer stopped answering, terminating"
            );
            terminate(cx, &session);
            continue;
        }
        if !session.is_logged_in() {
            continue;
        }

        if heartbeat.needs_heartbeat() {
            if let Some(probe) = P::active_test(&cx.seqs) {
                heartbeat.on_probe_sent();
                send(cx, &session, probe);
            }
        }
        mock_mo(cx, &session);
    }
}

fn terminate<P: ServerDialect>(cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>) {
    let frame = P::terminate(&cx.seqs);
    let grace = session.heartbeat().config().close_grace;
    let session = Arc::clone(session);
    cx.tasks.spawn(async move { session.terminate(&frame, grace).await });
}

fn send<P: ServerDialect>(cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>, frame: P::Frame) {
    let session = Arc::clone(session);
    cx.tasks.spawn(async move {
        if let Err(err) = session.send(&frame).await {
            debug!(session = session.id(), error = %err, "supervisor write failed");
        }
    });
}

/// Simulated mobile-originated message; does not count as peer traffic
fn mock_mo<P: ServerDialect>(cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>) {
    let Some((sub_no, text)) = cx.config.mock.next_mo() else {
        return;
    };
    let Some(record) = session.client() else {
        return;
    };
    match P::mock_mo(&record, &sub_no, &text, &cx.seqs) {
        Ok(frame) => {
            session.counters().mo.fetch_add(1, Ordering::Relaxed);
            send(cx, session, frame);
        }
        Err(err) => debug!(session = session.id(), error = %err, "mock MO not encodable"),
    }
}
