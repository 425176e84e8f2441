//! Connection identity and accounting.
//!
//! # Responsibilities
//! - Number accepted connections and validated requests
//! - Carry per-connection facts (peer address, TLS, port) into request handling
//! - Count live and accepted connections across every listener

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique number for a connection or a validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Facts about the accepted connection, stored in every request's extensions.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    /// The connection arrived over TLS.
    pub secure: bool,
    /// Local port the connection was accepted on.
    pub port: u16,
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicU64,
    accepted: AtomicU64,
}

/// Shared connection counters. Clones observe the same counts.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    counters: Arc<Counters>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection; it stays live until the handle drops.
    pub fn register(&self) -> LiveConnection {
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        LiveConnection {
            id: ConnectionId::next(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn live(&self) -> u64 {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Connections accepted since the registry was created.
    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }
}

/// Owned by a connection task for as long as it serves the connection.
#[derive(Debug)]
pub struct LiveConnection {
    id: ConnectionId,
    counters: Arc<Counters>,
}

impl LiveConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
