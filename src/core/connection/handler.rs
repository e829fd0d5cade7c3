// src/core/connection/handler.rs

//! Drives a single accepted TCP connection: decode frames, dispatch
//! commands, write replies, and — on the leader — apply the propagation
//! and replica-registration side effects spec.md §4.5 describes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::core::commands::{self, exec, Command};
use crate::core::errors::StoreError;
use crate::core::protocol::{Frame, FrameCodec};
use crate::core::replication::leader;
use crate::core::state::ServerState;

/// Runs the full lifetime of one accepted connection. Returns once the peer
/// disconnects or the wire protocol is violated.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), StoreError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    // A dedicated writer task owns the socket's write half so that both
    // ordinary replies and, if this connection becomes a replica sink,
    // propagated writes can be pushed onto it from anywhere without
    // fighting over a lock. Writes are frame-atomic: `write_all` either
    // lands the whole buffer or the task exits, never a partial frame.
    tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    let result = dispatch_loop(&mut reader, &tx, peer_addr, &state).await;
    state.replicas.remove(&peer_addr);
    match &result {
        Ok(()) => debug!(%peer_addr, "connection closed"),
        Err(e) => warn!(%peer_addr, error = %e, "connection terminated"),
    }
    result
}

async fn dispatch_loop(
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, FrameCodec>,
    tx: &mpsc::UnboundedSender<Bytes>,
    peer_addr: SocketAddr,
    state: &Arc<ServerState>,
) -> Result<(), StoreError> {
    loop {
        let decoded = match reader.next().await {
            Some(Ok(decoded)) => decoded,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        };

        let command = match commands::parse(&decoded.frame) {
            Ok(cmd) => cmd,
            Err(StoreError::Malformed(msg)) => return Err(StoreError::Malformed(msg)),
            Err(e) => {
                let _ = tx.send(Frame::error(e.as_reply_text()).encode_to_bytes());
                continue;
            }
        };

        // PSYNC and REPLCONF listening-port carry connection-level side
        // effects (socket handoff, replica registration) that don't fit
        // `exec::execute`'s plain command -> reply shape, mirroring the
        // teacher's own PSYNC/REPLCONF special-casing.
        match &command {
            Command::Psync { .. } => {
                let full_resync = leader::full_resync_reply(&state.master_replid);
                let _ = tx.send(full_resync.encode_to_bytes());
                let _ = tx.send(Frame::RdbBlob(crate::snapshot::empty_snapshot()).encode_to_bytes());
                continue;
            }
            Command::ReplconfListeningPort { .. } => {
                state.register_replica(peer_addr, tx.clone());
                let _ = tx.send(Frame::simple("OK").encode_to_bytes());
                continue;
            }
            _ => {}
        }

        match exec::execute(&command, state) {
            Ok(outcome) => {
                let _ = tx.send(outcome.reply.encode_to_bytes());
                if !state.is_follower() && command.propagated() {
                    state.propagate(&decoded.raw);
                }
            }
            Err(e) => {
                let _ = tx.send(Frame::error(e.as_reply_text()).encode_to_bytes());
            }
        }
    }
}
