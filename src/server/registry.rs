// ABOUTME: Concurrent registry of a server's sessions, owned by the server instance
// ABOUTME: Enforces the global session cap on accept and counts logged-in sessions per client

use crate::auth::ClientAuthRecord;
use crate::protocol::Protocol;
use crate::server::session::ServerSession;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Result of [`Registry::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// The account already has `max_conns` logged-in sessions
    TooManyConnections,
    /// The session closed before it could log in
    Closed,
}

/// Sessions of one server, keyed by session id
#[derive(Debug)]
pub struct Registry<P: Protocol> {
    sessions: DashMap<u64, Arc<ServerSession<P>>>,
    /// One entry per client id; its shard lock orders that account's logins
    login_gates: DashMap<String, ()>,
    active: AtomicUsize,
    capacity: usize,
    next_id: AtomicU64,
}

impl<P: Protocol> Registry<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            login_gates: DashMap::new(),
            active: AtomicUsize::new(0),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve a slot for a new connection. `None` when the server is full.
    pub fn reserve(&self) -> Option<u64> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.capacity).then_some(active + 1)
            })
            .ok()?;
        Some(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a session whose slot was reserved
    pub fn insert(&self, session: Arc<ServerSession<P>>) {
        self.sessions.insert(session.id(), session);
    }

    /// Drop a session and free its slot. Removing twice frees once.
    pub fn remove(&self, id: u64) -> Option<Arc<ServerSession<P>>> {
        let (_, session) = self.sessions.remove(&id)?;
        self.release();
        Some(session)
    }

    /// Give back a slot from [`Registry::reserve`] that never got a session
    pub fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| active.checked_sub(1));
    }

    pub fn get(&self, id: u64) -> Option<Arc<ServerSession<P>>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Log `session` in unless its account is at `max_conns`. Logins of one
    /// client id are serialized, so two of them never both pass the count.
    pub fn admit(&self, session: &ServerSession<P>, record: Arc<ClientAuthRecord>, version: u8) -> Admission {
        let _gate = self.login_gates.entry(record.client_id.clone()).or_default();
        if self.count_by_client(&record.client_id) >= usize::from(record.max_conns) {
            return Admission::TooManyConnections;
        }
        if session.complete_login(record, version) {
            Admission::Accepted
        } else {
            Admission::Closed
        }
    }

    /// Logged-in sessions of `client_id`
    pub fn count_by_client(&self, client_id: &str) -> usize {
        self.sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.is_logged_in() && session.client_id().as_deref() == Some(client_id)
            })
            .count()
    }

    /// Current sessions, for the supervisor to walk without holding shards
    pub fn snapshot(&self) -> Vec<Arc<ServerSession<P>>> {
        self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Connections counted against the cap, including ones still being set up
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
