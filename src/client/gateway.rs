// ABOUTME: Outbound entry point: routes each phone number to an operator factory by number-segment regex
// ABOUTME: Retries through back-pressure, assigns query ids and sweeps expired results into the sink

use crate::auth::{AuthStore, Isp};
use crate::client::config::{FactoryConfig, GatewayConfig};
use crate::client::factory::SessionFactory;
use crate::cmpp::Cmpp;
use crate::datatypes::MtOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::sequence::Sequences;
use crate::sgip::Sgip;
use crate::smgp::Smgp;
use crate::tracking::{NullSink, ResultSink, SendResult, Tracker};
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A factory of any dialect
#[derive(Debug, Clone)]
pub enum AnyFactory {
    Cmpp(Arc<SessionFactory<Cmpp>>),
    Sgip(Arc<SessionFactory<Sgip>>),
    Smgp(Arc<SessionFactory<Smgp>>),
}

macro_rules! each_factory {
    ($any:expr, $factory:ident => $body:expr) => {
        match $any {
            AnyFactory::Cmpp($factory) => $body,
            AnyFactory::Sgip($factory) => $body,
            AnyFactory::Smgp($factory) => $body,
        }
    };
}

impl AnyFactory {
    pub fn isp(&self) -> Isp {
        match self {
            AnyFactory::Cmpp(_) => Isp::Cmpp,
            AnyFactory::Sgip(_) => Isp::Sgip,
            AnyFactory::Smgp(_) => Isp::Smgp,
        }
    }

    pub async fn send(
        &self,
        query_id: u64,
        phones: &[String],
        content: &str,
        options: &MtOptions,
    ) -> GatewayResult<Vec<String>> {
        each_factory!(self, factory => factory.send(query_id, phones, content, options).await)
    }

    pub async fn resort(&self) {
        each_factory!(self, factory => factory.resort().await)
    }

    /// Healthy sessions right now
    pub fn healthy_sessions(&self) -> usize {
        each_factory!(self, factory => factory.sessions().iter().filter(|s| s.health()).count())
    }

    async fn close(&self) {
        each_factory!(self, factory => factory.close().await)
    }

    fn spawn(&self, tasks: &TaskTracker) {
        each_factory!(self, factory => {
            tasks.spawn(Arc::clone(factory).run());
        })
    }
}

#[derive(Debug)]
struct Route {
    segment: Regex,
    factory: AnyFactory,
}

/// Assembles a [`Gateway`] from per-operator links.
pub struct GatewayBuilder {
    config: GatewayConfig,
    seqs: Arc<Sequences>,
    tracker: Arc<Tracker>,
    sink: Arc<dyn ResultSink>,
    routes: Vec<Route>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            seqs: Arc::new(Sequences::new(config.sequences)),
            tracker: Arc::new(Tracker::new()),
            sink: Arc::new(NullSink),
            routes: Vec::new(),
            config,
        }
    }

    /// Where expired results go (default: dropped)
    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Add an operator link. The account is looked up in `store`; routes
    /// are tried in the order they were added.
    pub fn route(mut self, config: FactoryConfig, store: &dyn AuthStore) -> GatewayResult<Self> {
        let record = store
            .find(config.isp, &config.client_id)
            .ok_or_else(|| GatewayError::UnknownClient(format!("{}_{}", config.isp, config.client_id)))?;
        let segment = Regex::new(&config.segment)
            .map_err(|err| GatewayError::InvalidState(format!("bad number segment {:?}: {err}", config.segment)))?;

        let seqs = Arc::clone(&self.seqs);
        let tracker = Arc::clone(&self.tracker);
        let factory = match config.isp {
            Isp::Cmpp => AnyFactory::Cmpp(Arc::new(SessionFactory::new(config, record, seqs, tracker))),
            Isp::Sgip => AnyFactory::Sgip(Arc::new(SessionFactory::new(config, record, seqs, tracker))),
            Isp::Smgp => AnyFactory::Smgp(Arc::new(SessionFactory::new(config, record, seqs, tracker))),
        };
        self.routes.push(Route { segment, factory });
        Ok(self)
    }

    pub fn build(self) -> Gateway {
        Gateway {
            config: self.config,
            seqs: self.seqs,
            tracker: self.tracker,
            sink: self.sink,
            routes: self.routes,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Client side of the system: every configured operator link plus result
/// tracking.
pub struct Gateway {
    config: GatewayConfig,
    seqs: Arc<Sequences>,
    tracker: Arc<Tracker>,
    sink: Arc<dyn ResultSink>,
    routes: Vec<Route>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Spawn the re-sort task of every factory and the expiry sweep
    pub fn start(&self) {
        for route in &self.routes {
            route.factory.spawn(&self.tasks);
        }

        let tracker = Arc::clone(&self.tracker);
        let sink = Arc::clone(&self.sink);
        let cancel = self.cancel.clone();
        let ttl = self.config.tracking_ttl;
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = tracker.sweep(ttl, sink.as_ref());
                        if expired > 0 {
                            debug!(expired, "tracking sweep");
                        }
                    }
                }
            }
        });
        info!(routes = self.routes.len(), "gateway started");
    }

    /// Factory serving `phone`, first matching route wins
    pub fn route(&self, phone: &str) -> Option<&AnyFactory> {
        self.routes
            .iter()
            .find(|route| route.segment.is_match(phone))
            .map(|route| &route.factory)
    }

    /// Submit `content` to every phone and return the query id under which
    /// the results are tracked.
    ///
    /// Every phone must have a route or nothing is sent. While the chosen
    /// factory pushes back, the call sleeps `retry_interval` and tries
    /// again until `send_timeout` has passed.
    pub async fn send(&self, phones: &[&str], content: &str, options: &MtOptions) -> GatewayResult<u64> {
        let mut routed = Vec::with_capacity(phones.len());
        for phone in phones {
            let factory = self
                .route(phone)
                .ok_or_else(|| GatewayError::NoRoute((*phone).to_string()))?;
            routed.push((vec![(*phone).to_string()], factory));
        }

        let query_id = self.seqs.seq64.next_val();
        let deadline = Instant::now() + self.config.send_timeout;
        for (phone, factory) in &routed {
            loop {
                match factory.send(query_id, phone, content, options).await {
                    Ok(sequences) => {
                        debug!(query_id, phone = %phone[0], isp = %factory.isp(), segments = sequences.len(), "sent");
                        break;
                    }
                    Err(err) if err.is_transient() && Instant::now() < deadline => {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                    Err(err) => {
                        warn!(query_id, phone = %phone[0], isp = %factory.isp(), error = %err, "send failed");
                        return Err(err);
                    }
                }
            }
        }
        Ok(query_id)
    }

    /// Results tracked for `query_id`, until the sweep expires them
    pub fn query(&self, query_id: u64) -> Option<Vec<SendResult>> {
        self.tracker.query(query_id)
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn factories(&self) -> impl Iterator<Item = &AnyFactory> {
        self.routes.iter().map(|route| &route.factory)
    }

    /// Stop background tasks, terminate every session and hand the
    /// remaining results to the sink.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for route in &self.routes {
            route.factory.close().await;
        }
        self.tasks.close();
        self.tasks.wait().await;
        self.tracker.sweep(std::time::Duration::ZERO, self.sink.as_ref());
        info!("gateway stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ClientAuthRecord, MemoryAuthStore};
    use crate::cmpp;

    fn store() -> MemoryAuthStore {
        [
            ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30),
            ClientAuthRecord::new(Isp::Smgp, "10010", "secret", crate::smgp::V30),
        ]
        .into_iter()
        .collect()
    }

    fn gateway() -> Gateway {
        let store = store();
        GatewayBuilder::new(GatewayConfig::default())
            .route(FactoryConfig::new(Isp::Cmpp, "901234", "127.0.0.1:1", r"^1(3[4-9]|5[0-27-9])"), &store)
            .unwrap()
            .route(FactoryConfig::new(Isp::Smgp, "10010", "127.0.0.1:1", r"^1(33|53|8[019])"), &store)
            .unwrap()
            .build()
    }

    #[test]
    fn phones_route_by_segment() {
        let gateway = gateway();
        assert_eq!(gateway.route("13800138000").map(AnyFactory::isp), Some(Isp::Cmpp));
        assert_eq!(gateway.route("18912345678").map(AnyFactory::isp), Some(Isp::Smgp));
        assert!(gateway.route("17012345678").is_none());
    }

    #[test]
    fn unknown_account_is_rejected() {
        let store = store();
        let result = GatewayBuilder::new(GatewayConfig::default())
            .route(FactoryConfig::new(Isp::Sgip, "missing", "127.0.0.1:1", "^1"), &store);
        assert!(matches!(result, Err(GatewayError::UnknownClient(_))));
    }

    #[test]
    fn bad_segment_is_rejected() {
        let store = store();
        let result = GatewayBuilder::new(GatewayConfig::default())
            .route(FactoryConfig::new(Isp::Cmpp, "901234", "127.0.0.1:1", "^1(["), &store);
        assert!(matches!(result, Err(GatewayError::InvalidState(_))));
    }

    #[tokio::test]
    async fn unroutable_phone_sends_nothing() {
        let gateway = gateway();
        let result = gateway.send(&["13800138000", "17012345678"], "hi", &MtOptions::default()).await;
        assert!(matches!(result, Err(GatewayError::NoRoute(phone)) if phone == "17012345678"));
        assert!(gateway.tracker().is_empty());
    }

    #[tokio::test]
    async fn no_session_times_out_as_pool_exhausted() {
        let store = store();
        let gateway = GatewayBuilder::new(
            GatewayConfig::default().with_send_timeout(std::time::Duration::from_millis(20)),
        )
        .route(FactoryConfig::new(Isp::Cmpp, "901234", "127.0.0.1:1", "^1"), &store)
        .unwrap()
        .build();

        let result = gateway.send(&["13800138000"], "hi", &MtOptions::default()).await;
        assert!(matches!(result, Err(GatewayError::PoolExhausted) | Err(GatewayError::FlowControl)));
    }
}
