// ABOUTME: Mock operator gateway: accepts CMPP, SGIP or SMGP connections and answers like an SMSC would
// ABOUTME: Accept loop with a session cap, one reader task per connection and a tick supervisor

//! Server side of a gateway dialect.
//!
//! ```rust,no_run
//! use smsgate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
//! use smsgate::cmpp::{self, Cmpp};
//! use smsgate::server::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: MemoryAuthStore = [ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", cmpp::V30)]
//!         .into_iter()
//!         .collect();
//!
//!     let server = Server::<Cmpp>::bind(ServerConfig::new("0.0.0.0:7890"), Arc::new(store)).await?;
//!     let handle = server.handle();
//!     tokio::spawn(server.run());
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialect;
pub mod handler;
pub mod registry;
pub mod session;
mod tick;

pub use config::{MockConfig, ServerConfig};
pub use dialect::{LoginCheck, Request, ServerDialect};
pub use handler::{Disposition, Handler, HandlerChain};
pub use registry::{Admission, Registry};
pub use session::{Counters, ServerSession, SessionResources};

use crate::auth::AuthStore;
use crate::connection::{FrameReader, FrameWriter, SharedWriter};
use crate::error::{GatewayError, GatewayResult};
use crate::flow_control::WorkerPool;
use crate::sequence::Sequences;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Everything a handler can reach
pub struct ServerContext<P: ServerDialect> {
    pub(crate) config: ServerConfig,
    pub(crate) store: Arc<dyn AuthStore>,
    pub(crate) registry: Registry<P>,
    pub(crate) seqs: Sequences,
    pub(crate) chain: HandlerChain<P>,
    pub(crate) login_pool: WorkerPool,
    pub(crate) tasks: TaskTracker,
    pub(crate) cancel: CancellationToken,
}

impl<P: ServerDialect> std::fmt::Debug for ServerContext<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("addr", &self.config.addr)
            .field("isp", &P::ISP)
            .field("sessions", &self.registry.len())
            .finish()
    }
}

impl<P: ServerDialect> ServerContext<P> {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn AuthStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &Registry<P> {
        &self.registry
    }

    pub fn seqs(&self) -> &Sequences {
        &self.seqs
    }

    /// Run `task` alongside the server; shutdown waits for it
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }
}

/// A bound listener, not yet accepting
#[derive(Debug)]
pub struct Server<P: ServerDialect> {
    listener: TcpListener,
    cx: Arc<ServerContext<P>>,
}

impl<P: ServerDialect> Server<P> {
    /// Bind with the default handler chain
    pub async fn bind(config: ServerConfig, store: Arc<dyn AuthStore>) -> GatewayResult<Self> {
        Self::bind_with(config, store, HandlerChain::default()).await
    }

    pub async fn bind_with(config: ServerConfig, store: Arc<dyn AuthStore>, chain: HandlerChain<P>) -> GatewayResult<Self> {
        let listener = TcpListener::bind(config.addr.as_str()).await?;
        let cx = ServerContext {
            registry: Registry::new(config.max_sessions),
            seqs: Sequences::new(config.sequences),
            login_pool: WorkerPool::new(config.login_workers),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
            chain,
            store,
            config,
        };
        Ok(Self {
            listener,
            cx: Arc::new(cx),
        })
    }

    pub fn local_addr(&self) -> GatewayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle<P> {
        ServerHandle {
            cx: Arc::clone(&self.cx),
        }
    }

    /// Accept until [`ServerHandle::shutdown`]
    pub async fn run(self) {
        let Server { listener, cx } = self;
        info!(
            isp = %P::ISP,
            addr = ?listener.local_addr().ok(),
            max_sessions = cx.config.max_sessions,
            "server listening"
        );
        cx.tasks.spawn(tick::supervise(Arc::clone(&cx)));

        loop {
            let accepted = tokio::select! {
                _ = cx.cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((socket, peer)) => accept(&cx, socket, peer),
                Err(err) => warn!(error = %err, "accept failed"),
            }
        }
        info!(isp = %P::ISP, "server stopped accepting");
    }
}

/// Admit a connection if the cap allows, otherwise hang up right away
fn accept<P: ServerDialect>(cx: &Arc<ServerContext<P>>, socket: TcpStream, peer: SocketAddr) {
    let Some(id) = cx.registry.reserve() else {
        warn!(%peer, active = cx.registry.active(), "session limit reached, refusing");
        return;
    };
    let _ = socket.set_nodelay(true);

    let (read, write) = socket.into_split();
    let session = Arc::new(ServerSession::new(
        id,
        Some(peer),
        SharedWriter::new(FrameWriter::new(write)),
        cx.config.heartbeat.clone(),
    ));
    cx.registry.insert(Arc::clone(&session));
    debug!(session = id, %peer, "connection accepted");

    cx.tasks.spawn(serve(Arc::clone(cx), session, FrameReader::new(read)));
}

/// Reader task of one connection. Framing and decode errors are fatal.
async fn serve<P: ServerDialect>(cx: Arc<ServerContext<P>>, session: Arc<ServerSession<P>>, mut reader: FrameReader<P>) {
    loop {
        let read = tokio::select! {
            _ = session.cancelled() => break,
            read = reader.read_frame(session.version()) => read,
        };
        match read {
            Ok(Some(frame)) => {
                session.heartbeat().on_traffic();
                if cx.chain.dispatch(&cx, &session, &frame) == Disposition::Close {
                    break;
                }
            }
            Ok(None) => {
                debug!(session = session.id(), "peer hung up");
                break;
            }
            Err(GatewayError::Codec(err)) => {
                error!(session = session.id(), peer = ?session.peer_addr(), error = %err, "bad packet, dropping connection");
                break;
            }
            Err(err) => {
                warn!(session = session.id(), peer = ?session.peer_addr(), error = %err, "read failed, dropping connection");
                break;
            }
        }
    }
    session.close().await;
    cx.registry.remove(session.id());
}

/// Control of a running server
#[derive(Debug, Clone)]
pub struct ServerHandle<P: ServerDialect> {
    cx: Arc<ServerContext<P>>,
}

impl<P: ServerDialect> ServerHandle<P> {
    pub fn sessions(&self) -> Vec<Arc<ServerSession<P>>> {
        self.cx.registry.snapshot()
    }

    /// Connections counted against the cap
    pub fn active(&self) -> usize {
        self.cx.registry.active()
    }

    pub fn context(&self) -> &Arc<ServerContext<P>> {
        &self.cx
    }

    /// Stop accepting, close every session and wait for server tasks
    pub async fn shutdown(&self) {
        self.cx.cancel.cancel();
        for session in self.cx.registry.snapshot() {
            session.close().await;
        }
        self.cx.login_pool.close();
        self.cx.login_pool.wait().await;
        self.cx.tasks.close();
        self.cx.tasks.wait().await;
        info!(isp = %P::ISP, "server shut down");
    }
}
