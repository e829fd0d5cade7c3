// src/core/replication/follower.rs

//! The follower's long-lived link to its leader: connect, perform the
//! 4-step handshake, consume the snapshot blob, then run a dispatch loop
//! that applies propagated writes and tracks the replication offset.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::core::commands::{self, exec, Command};
use crate::core::errors::StoreError;
use crate::core::protocol::{Frame, FrameCodec};
use crate::core::state::ServerState;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const HANDSHAKE_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs forever (until shutdown): connect to the leader, replicate, and on
/// disconnect reconnect with exponential backoff and jitter.
pub async fn run(
    leader_addr: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut delay = INITIAL_RECONNECT_DELAY;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("follower link shutting down");
                return;
            }
            result = connect_and_run(leader_addr, &state) => {
                match result {
                    Ok(()) => {
                        info!(%leader_addr, "connection to leader closed cleanly, reconnecting");
                        delay = INITIAL_RECONNECT_DELAY;
                    }
                    Err(e) => {
                        warn!(%leader_addr, error = %e, "replication cycle failed, reconnecting");
                    }
                }
            }
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
        tokio::select! {
            _ = tokio::time::sleep(delay + jitter) => {}
            _ = shutdown_rx.recv() => return,
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

async fn connect_and_run(leader_addr: SocketAddr, state: &Arc<ServerState>) -> Result<(), StoreError> {
    let stream = TcpStream::connect(leader_addr).await?;
    let own_port = state.config.listen_addr.port();
    let (read_half, mut write_half) = stream.into_split();
    let mut framed = FramedRead::new(read_half, FrameCodec);

    perform_handshake(&mut framed, &mut write_half, own_port, leader_addr).await?;
    info!(%leader_addr, "handshake complete, awaiting snapshot");

    // The snapshot is an unterminated bulk payload (`$<len>\r\n<len bytes>`,
    // no trailing CRLF) which the normal frame grammar cannot decode, so the
    // stream is temporarily un-framed to read it at the byte level —
    // mirroring the teacher's own into_inner()-then-BufReader dance.
    let reader = framed.into_inner();
    let mut buf_reader = BufReader::new(reader);
    read_and_discard_snapshot(&mut buf_reader, leader_addr).await?;

    state.reset_follower_offset();
    let mut framed = FramedRead::new(buf_reader.into_inner(), FrameCodec);

    process_command_stream(&mut framed, &mut write_half, state).await;
    Ok(())
}

/// Sends one handshake request and waits for its reply, both bounded by
/// `HANDSHAKE_STEP_TIMEOUT` (spec.md §5: "the follower handshake must have
/// a bounded read timeout per step").
async fn expect_simple_string<R>(
    framed: &mut FramedRead<R, FrameCodec>,
    expected_prefix: &str,
    leader_addr: SocketAddr,
) -> Result<String, StoreError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let decoded = tokio::time::timeout(HANDSHAKE_STEP_TIMEOUT, framed.next())
        .await
        .map_err(|_| StoreError::Handshake(leader_addr, "timed out waiting for reply".into()))?
        .ok_or_else(|| StoreError::Handshake(leader_addr, "connection closed during handshake".into()))??;

    match decoded.frame {
        Frame::SimpleString(s) if s.to_ascii_uppercase().starts_with(expected_prefix) => Ok(s),
        Frame::Error(e) => Err(StoreError::Handshake(leader_addr, format!("leader returned error: {e}"))),
        other => Err(StoreError::Handshake(
            leader_addr,
            format!("expected {expected_prefix}, got {other:?}"),
        )),
    }
}

async fn perform_handshake<R, W>(
    framed: &mut FramedRead<R, FrameCodec>,
    writer: &mut W,
    own_port: u16,
    leader_addr: SocketAddr,
) -> Result<(), StoreError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    writer
        .write_all(&Frame::command(&["PING".as_bytes()]).encode_to_bytes())
        .await?;
    expect_simple_string(framed, "PONG", leader_addr).await?;
    debug!("handshake step 1/4 (PING) ok");

    writer
        .write_all(
            &Frame::command(&[
                "REPLCONF".as_bytes(),
                "listening-port".as_bytes(),
                own_port.to_string().as_bytes(),
            ])
            .encode_to_bytes(),
        )
        .await?;
    expect_simple_string(framed, "OK", leader_addr).await?;
    debug!("handshake step 2/4 (REPLCONF listening-port) ok");

    writer
        .write_all(&Frame::command(&["REPLCONF".as_bytes(), "capa".as_bytes(), "psync2".as_bytes()]).encode_to_bytes())
        .await?;
    expect_simple_string(framed, "OK", leader_addr).await?;
    debug!("handshake step 3/4 (REPLCONF capa) ok");

    writer
        .write_all(&Frame::command(&["PSYNC".as_bytes(), "?".as_bytes(), "-1".as_bytes()]).encode_to_bytes())
        .await?;
    expect_simple_string(framed, "FULLRESYNC", leader_addr).await?;
    debug!("handshake step 4/4 (PSYNC) ok, leader ordered FULLRESYNC");

    Ok(())
}

async fn read_and_discard_snapshot<R>(reader: &mut BufReader<R>, leader_addr: SocketAddr) -> Result<(), StoreError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let line = line.trim_end();
    let len = crate::core::protocol::parse_rdb_header(line.as_bytes())
        .map_err(|_| StoreError::Handshake(leader_addr, format!("bad snapshot header: {line:?}")))?;

    let mut blob = BytesMut::with_capacity(len);
    blob.resize(len, 0);
    reader.read_exact(&mut blob).await?;
    debug!(bytes = len, "consumed snapshot blob");
    Ok(())
}

/// Runs once the handshake and snapshot are done: applies every propagated
/// frame and tracks `replication_offset`. Replies are suppressed except for
/// `REPLCONF GETACK`, whose reply must reflect the offset accumulated
/// *before* the GETACK frame itself — so the offset is only bumped after
/// the frame has been dispatched.
async fn process_command_stream<R, W>(
    framed: &mut FramedRead<R, FrameCodec>,
    writer: &mut W,
    state: &Arc<ServerState>,
) where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(result) = framed.next().await {
        let decoded = match result {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "malformed frame from leader, disconnecting");
                break;
            }
        };
        let frame_len = decoded.raw.len() as i64;

        let command = match commands::parse(&decoded.frame) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not parse command propagated from leader, disconnecting");
                break;
            }
        };

        if let Err(e) = apply_propagated_command(&command, state, writer).await {
            warn!(error = %e, "failed to apply command from leader, disconnecting");
            break;
        }

        state.add_follower_offset(frame_len);
    }
}

async fn apply_propagated_command<W>(
    command: &Command,
    state: &Arc<ServerState>,
    writer: &mut W,
) -> Result<(), StoreError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if let Command::ReplconfGetAck = command {
        let ack = Frame::command(&[
            "REPLCONF".as_bytes(),
            "ACK".as_bytes(),
            state.follower_replication_offset().to_string().as_bytes(),
        ]);
        writer.write_all(&ack.encode_to_bytes()).await?;
        return Ok(());
    }

    // Every other propagated command is applied silently: spec.md §4.4
    // suppresses replies on the leader->follower channel except for
    // `server_answer` commands (only `REPLCONF GETACK`). `apply` (not
    // `execute`) is used deliberately — this is the follower's own
    // keyspace being kept in sync, not a client write to reject.
    let _ = exec::apply(command, state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use bytes::Bytes;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(Config::from_args(&[]).unwrap()))
    }

    #[tokio::test]
    async fn getack_reply_uses_offset_accumulated_before_this_frame() {
        let state = state();
        state.add_follower_offset(37);
        let (mut client, mut server) = tokio::io::duplex(256);

        apply_propagated_command(&Command::ReplconfGetAck, &state, &mut server)
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        let expected =
            Frame::command(&["REPLCONF".as_bytes(), "ACK".as_bytes(), "37".as_bytes()]).encode_to_bytes();
        assert_eq!(&buf[..n], &expected[..]);
    }

    #[tokio::test]
    async fn propagated_set_is_applied_with_no_reply() {
        let state = state();
        let (mut client, mut server) = tokio::io::duplex(256);

        apply_propagated_command(
            &Command::Set {
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"v"),
                px: None,
            },
            &state,
            &mut server,
        )
        .await
        .unwrap();

        assert_eq!(state.keyspace.get(b"k").as_deref(), Some(&b"v"[..]));

        let mut buf = [0u8; 1];
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), client.read(&mut buf)).await;
        assert!(result.is_err(), "propagated SET must not produce a reply");
    }
}
