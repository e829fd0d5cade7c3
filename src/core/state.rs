// src/core/state.rs

//! The server-wide shared handle: configuration, the keyspace, and
//! replication bookkeeping. Held behind an `Arc` and cloned into every
//! connection task, the way the teacher's `ServerState` is.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use crate::config::{Config, Mode};
use crate::core::keyspace::Keyspace;

/// A write-only reference to a registered replica's socket, captured the
/// moment the peer identifies itself via `REPLCONF listening-port`.
/// Removed from the registry the first time a write to it fails.
pub type ReplicaSink = mpsc::UnboundedSender<bytes::Bytes>;

/// Leader-side replication bookkeeping.
#[derive(Debug, Default)]
pub struct LeaderReplState {
    /// Bytes of write traffic emitted since startup.
    pub master_repl_offset: AtomicI64,
}

/// Follower-side replication bookkeeping. `None` until the handshake with
/// the leader completes.
#[derive(Debug, Default)]
pub struct FollowerReplState {
    /// Bytes of propagated traffic consumed from the leader, counted after
    /// the initial snapshot handshake completes.
    pub replication_offset: AtomicI64,
}

pub struct ServerState {
    pub config: Config,
    pub keyspace: Keyspace,
    /// A fixed 40-hex-character string identifying this leader's
    /// replication stream, constant for the process lifetime.
    pub master_replid: String,
    pub leader_repl: LeaderReplState,
    pub follower_repl: FollowerReplState,
    /// Leader-only: one sink per registered replica connection.
    pub replicas: DashMap<SocketAddr, ReplicaSink>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            keyspace: Keyspace::new(),
            master_replid: generate_replid(),
            leader_repl: LeaderReplState::default(),
            follower_repl: FollowerReplState::default(),
            replicas: DashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn is_follower(&self) -> bool {
        self.config.mode == Mode::Follower
    }

    /// Registers a replica sink, keyed by the peer's advertised address
    /// (the connection's IP with its own `listening-port`).
    pub fn register_replica(&self, addr: SocketAddr, sink: ReplicaSink) {
        self.replicas.insert(addr, sink);
    }

    /// Best-effort fan-out of the *original request bytes* to every
    /// registered replica. A failing send drops that replica; it never
    /// aborts the caller's command or affects the client's reply.
    pub fn propagate(&self, raw: &bytes::Bytes) {
        self.leader_repl
            .master_repl_offset
            .fetch_add(raw.len() as i64, Ordering::SeqCst);
        self.replicas
            .retain(|_, sink| sink.send(raw.clone()).is_ok());
    }

    pub fn master_repl_offset(&self) -> i64 {
        self.leader_repl.master_repl_offset.load(Ordering::SeqCst)
    }

    pub fn follower_replication_offset(&self) -> i64 {
        self.follower_repl.replication_offset.load(Ordering::SeqCst)
    }

    pub fn reset_follower_offset(&self) {
        self.follower_repl.replication_offset.store(0, Ordering::SeqCst);
    }

    pub fn add_follower_offset(&self, len: i64) {
        self.follower_repl
            .replication_offset
            .fetch_add(len, Ordering::SeqCst);
    }
}

/// Generates a 40-hex-character replication id, the way a fresh leader
/// mints one at startup.
fn generate_replid() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}
