// ABOUTME: Ordered chain of request handlers the server's reader task runs every inbound PDU through
// ABOUTME: Handlers decide synchronously and push slow work (login, mock submit replies) onto worker pools

use crate::server::ServerContext;
use crate::server::dialect::{Request, ServerDialect};
use crate::error::GatewayError;
use crate::flow_control::WindowPermit;
use crate::server::registry::Admission;
use crate::server::session::ServerSession;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// What the reader does after a handler looked at a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not mine, ask the next handler
    Next,
    /// Handled, keep reading
    Continue,
    /// Drop the connection
    Close,
}

/// One link of the chain
pub trait Handler<P: ServerDialect>: Send + Sync {
    fn handle(
        &self,
        cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition;
}

/// Handlers in the order they are asked
pub struct HandlerChain<P: ServerDialect> {
    handlers: Vec<Box<dyn Handler<P>>>,
}

impl<P: ServerDialect> std::fmt::Debug for HandlerChain<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain").field("handlers", &self.handlers.len()).finish()
    }
}

impl<P: ServerDialect> Default for HandlerChain<P> {
    /// Submit first since it is the bulk of the traffic
    fn default() -> Self {
        Self::empty()
            .push(SubmitHandler)
            .push(HeartbeatHandler)
            .push(HeartbeatAckHandler)
            .push(DeliveryAckHandler)
            .push(LoginHandler)
            .push(TerminateHandler)
            .push(TerminateAckHandler)
    }
}

impl<P: ServerDialect> HandlerChain<P> {
    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn push(mut self, handler: impl Handler<P> + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `frame` through the chain. Only a login may come before login;
    /// frames nobody claims are logged and skipped.
    pub fn dispatch(&self, cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>, frame: &P::Frame) -> Disposition {
        let request = P::request(frame);
        if !session.is_logged_in() && !matches!(request, Request::Login) {
            debug!(
                session = session.id(),
                command_id = format_args!("{:#x}", P::command_of(frame)),
                "request before login"
            );
            return Disposition::Close;
        }

        for handler in &self.handlers {
            match handler.handle(cx, session, frame, &request) {
                Disposition::Next => continue,
                disposition => return disposition,
            }
        }

        debug!(
            session = session.id(),
            command_id = format_args!("{:#x}", P::command_of(frame)),
            "unhandled request"
        );
        Disposition::Continue
    }
}

/// Send `frame` from a server task without holding up the reader
fn reply_later<P: ServerDialect>(cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>, frame: P::Frame) {
    let session = Arc::clone(session);
    cx.tasks.spawn(async move {
        if let Err(err) = session.send(&frame).await {
            debug!(session = session.id(), error = %err, "reply failed");
        }
    });
}

/// Rate-limits submits and answers them through the session's worker pool
#[derive(Debug, Default)]
pub struct SubmitHandler;

impl<P: ServerDialect> Handler<P> for SubmitHandler {
    fn handle(
        &self,
        cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        if !matches!(request, Request::Submit) {
            return Disposition::Next;
        }
        let Ok(resources) = session.resources() else {
            return Disposition::Close;
        };

        if !resources.limiter.allow() {
            debug!(session = session.id(), "submit over the rate limit");
            reject_submit(cx, session, frame);
            return Disposition::Continue;
        }

        let permit = match resources.window.try_acquire() {
            Ok(permit) => permit,
            Err(GatewayError::FlowControl) => {
                debug!(session = session.id(), in_flight = resources.window.in_flight(), "submit window full");
                reject_submit(cx, session, frame);
                return Disposition::Continue;
            }
            Err(_) => return Disposition::Close,
        };

        let job = answer_submit(Arc::clone(cx), Arc::clone(session), permit, frame.clone());
        match resources.pool.submit(job) {
            Ok(()) => Disposition::Continue,
            Err(GatewayError::FlowControl) => {
                debug!(session = session.id(), workers = resources.pool.active(), "submit workers busy");
                reject_submit(cx, session, frame);
                Disposition::Continue
            }
            Err(err) => {
                debug!(session = session.id(), error = %err, "submit workers closed");
                Disposition::Close
            }
        }
    }
}

/// Answer `frame` with the dialect's flow-control status; the link stays up
fn reject_submit<P: ServerDialect>(cx: &Arc<ServerContext<P>>, session: &Arc<ServerSession<P>>, frame: &P::Frame) {
    if let Some(response) = P::submit_response(frame, P::FLOW_CONTROL, &cx.seqs) {
        reply_later(cx, session, response);
    }
}

/// Play the operator: hold the window slot for the simulated processing
/// time, answer, then maybe follow up with a status report.
async fn answer_submit<P: ServerDialect>(
    cx: Arc<ServerContext<P>>,
    session: Arc<ServerSession<P>>,
    permit: WindowPermit,
    submit: P::Frame,
) {
    let mock = &cx.config.mock;

    let delay = mock.response_delay();
    if !delay.is_zero() {
        tokio::select! {
            _ = session.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let status = if mock.submit_succeeds() { 0 } else { P::SUBMIT_FAILURE };
    let Some(response) = P::submit_response(&submit, status, &cx.seqs) else {
        return;
    };
    if let Err(err) = session.send(&response).await {
        debug!(session = session.id(), error = %err, "submit response failed");
        return;
    }
    session.counters().mt.fetch_add(1, Ordering::Relaxed);
    drop(permit);

    if status != 0 || !mock.report_wanted() {
        return;
    }
    let Some(report) = P::status_report(&submit, &response, &cx.seqs) else {
        return;
    };
    if !mock.report_delay.is_zero() {
        tokio::select! {
            _ = session.cancelled() => return,
            _ = tokio::time::sleep(mock.report_delay) => {}
        }
    }
    match session.send(&report).await {
        Ok(()) => {
            session.counters().report.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => debug!(session = session.id(), error = %err, "status report failed"),
    }
}

/// Answers the peer's ActiveTest
#[derive(Debug, Default)]
pub struct HeartbeatHandler;

impl<P: ServerDialect> Handler<P> for HeartbeatHandler {
    fn handle(
        &self,
        cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        _frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        let Request::Heartbeat { reply } = request else {
            return Disposition::Next;
        };
        reply_later(cx, session, reply.clone());
        Disposition::Continue
    }
}

/// The peer answered one of our probes; the reader already counted it as traffic
#[derive(Debug, Default)]
pub struct HeartbeatAckHandler;

impl<P: ServerDialect> Handler<P> for HeartbeatAckHandler {
    fn handle(
        &self,
        _cx: &Arc<ServerContext<P>>,
        _session: &Arc<ServerSession<P>>,
        _frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        match request {
            Request::HeartbeatAck => Disposition::Continue,
            _ => Disposition::Next,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryAckHandler;

impl<P: ServerDialect> Handler<P> for DeliveryAckHandler {
    fn handle(
        &self,
        _cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        if !matches!(request, Request::DeliveryAck) {
            return Disposition::Next;
        }
        debug!(session = session.id(), seq = %P::sequence_of(frame), "delivery acknowledged");
        Disposition::Continue
    }
}

/// Authenticates on the server's login pool. A second login on the same
/// connection drops it.
#[derive(Debug, Default)]
pub struct LoginHandler;

impl<P: ServerDialect> Handler<P> for LoginHandler {
    fn handle(
        &self,
        cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        if !matches!(request, Request::Login) {
            return Disposition::Next;
        }
        if session.is_logged_in() {
            warn!(session = session.id(), client_id = ?session.client_id(), "repeated login");
            return Disposition::Close;
        }

        let job = login(Arc::clone(cx), Arc::clone(session), frame.clone());
        match cx.login_pool.submit(job) {
            Ok(()) => Disposition::Continue,
            Err(err) => {
                warn!(session = session.id(), error = %err, "login workers exhausted");
                Disposition::Close
            }
        }
    }
}

async fn login<P: ServerDialect>(cx: Arc<ServerContext<P>>, session: Arc<ServerSession<P>>, frame: P::Frame) {
    let Some(mut check) = P::check_login(&frame, cx.store.as_ref()) else {
        session.close().await;
        return;
    };

    // Logged in before the response leaves
    let mut accepted = false;
    if let (0, Some(record)) = (check.status, &check.record) {
        match cx.registry.admit(&session, Arc::clone(record), check.version) {
            Admission::Accepted => accepted = true,
            Admission::TooManyConnections => check.status = P::TOO_MANY_CONNECTIONS,
            Admission::Closed => {}
        }
    }

    let Some(response) = P::login_response(&frame, check.status, check.record.as_deref()) else {
        session.close().await;
        return;
    };
    if let Err(err) = session.send(&response).await {
        debug!(session = session.id(), error = %err, "login response failed");
        session.close().await;
        return;
    }

    if accepted {
        info!(
            session = session.id(),
            isp = %P::ISP,
            client_id = %check.client_id,
            version = format_args!("{:#x}", check.version),
            peer = ?session.peer_addr(),
            "login accepted"
        );
    } else {
        warn!(
            session = session.id(),
            isp = %P::ISP,
            client_id = %check.client_id,
            status = check.status,
            peer = ?session.peer_addr(),
            "login rejected"
        );
        session.close().await;
    }
}

/// Peer asked to leave: answer, then hang up
#[derive(Debug, Default)]
pub struct TerminateHandler;

impl<P: ServerDialect> Handler<P> for TerminateHandler {
    fn handle(
        &self,
        cx: &Arc<ServerContext<P>>,
        session: &Arc<ServerSession<P>>,
        _frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        let Request::Terminate { reply } = request else {
            return Disposition::Next;
        };
        info!(session = session.id(), client_id = ?session.client_id(), "peer terminated");
        let session = Arc::clone(session);
        let reply = reply.clone();
        cx.tasks.spawn(async move {
            let _ = session.send(&reply).await;
            session.close().await;
        });
        Disposition::Continue
    }
}

/// Answer to our own terminate request
#[derive(Debug, Default)]
pub struct TerminateAckHandler;

impl<P: ServerDialect> Handler<P> for TerminateAckHandler {
    fn handle(
        &self,
        _cx: &Arc<ServerContext<P>>,
        _session: &Arc<ServerSession<P>>,
        _frame: &P::Frame,
        request: &Request<P::Frame>,
    ) -> Disposition {
        match request {
            Request::TerminateAck => Disposition::Close,
            _ => Disposition::Next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_order() {
        let chain = HandlerChain::<crate::cmpp::Cmpp>::default();
        assert_eq!(chain.len(), 7);
        assert!(HandlerChain::<crate::sgip::Sgip>::empty().is_empty());
    }
}
