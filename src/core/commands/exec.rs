// src/core/commands/exec.rs

//! Executes a parsed `Command` against `ServerState`. `Psync` and
//! `ReplconfListeningPort` are deliberately not handled here — like the
//! teacher's own `psync.rs`/`replconf.rs`, they need connection-level
//! side effects (socket handoff, replica registration) that only the
//! connection handler can perform.

use crate::core::commands::Command;
use crate::core::errors::StoreError;
use crate::core::protocol::Frame;
use crate::core::state::ServerState;

/// The outcome of executing a non-specially-handled command.
pub struct ExecOutcome {
    pub reply: Frame,
}

/// Executes a command submitted by a normal client connection. `SET`
/// arriving here while this process is a follower is rejected per
/// spec.md §9 Open Question 2 (DESIGN.md: reject, don't tolerate).
pub fn execute(cmd: &Command, state: &ServerState) -> Result<ExecOutcome, StoreError> {
    if let Command::Set { .. } = cmd {
        if state.is_follower() {
            return Err(StoreError::Argument(
                "READONLY You can't write against a read only replica.".into(),
            ));
        }
    }
    apply(cmd, state)
}

/// Applies a command without the follower-write guard. Used for commands
/// propagated from the leader onto the follower's own keyspace — those are
/// not "writes against a read only replica", they're how that replica stays
/// in sync.
pub fn apply(cmd: &Command, state: &ServerState) -> Result<ExecOutcome, StoreError> {
    let reply = match cmd {
        Command::Ping => Frame::simple("PONG"),
        Command::Echo { value } => Frame::bulk(value.clone()),
        Command::Set { key, value, px } => {
            state.keyspace.set(key.clone(), value.clone(), *px);
            Frame::simple("OK")
        }
        Command::Get { key } => match state.keyspace.get(key) {
            Some(v) => Frame::bulk(v),
            None => Frame::null_bulk(),
        },
        Command::Info => Frame::bulk(info_text(state)),
        Command::ReplconfCapa => Frame::simple("OK"),
        Command::ReplconfGetAck => Frame::command(&[
            "REPLCONF".as_bytes(),
            "ACK".as_bytes(),
            state.follower_replication_offset().to_string().as_bytes(),
        ]),
        Command::Wait { .. } => Frame::Integer(0),
        Command::Unknown { .. } => Frame::error("Unknown command"),
        Command::Psync { .. } | Command::ReplconfListeningPort { .. } => {
            return Err(StoreError::Argument(format!(
                "{} must be handled by the connection handler, not execute()",
                cmd.name()
            )));
        }
    };
    Ok(ExecOutcome { reply })
}

fn info_text(state: &ServerState) -> String {
    let role = match state.mode() {
        crate::config::Mode::Leader => "master",
        crate::config::Mode::Follower => "slave",
    };
    let offset = match state.mode() {
        crate::config::Mode::Leader => state.master_repl_offset(),
        crate::config::Mode::Follower => state.follower_replication_offset(),
    };
    format!(
        "role:{role}, master_replid:{}, master_repl_offset:{}",
        state.master_replid, offset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use bytes::Bytes;

    fn leader_state() -> ServerState {
        ServerState::new(Config::from_args(&[]).unwrap())
    }

    #[test]
    fn ping_replies_pong() {
        let state = leader_state();
        let out = execute(&Command::Ping, &state).unwrap();
        assert_eq!(out.reply, Frame::simple("PONG"));
    }

    #[test]
    fn get_missing_key_is_null_bulk() {
        let state = leader_state();
        let out = execute(
            &Command::Get {
                key: Bytes::from_static(b"nope"),
            },
            &state,
        )
        .unwrap();
        assert_eq!(out.reply, Frame::null_bulk());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let state = leader_state();
        execute(
            &Command::Set {
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"v"),
                px: None,
            },
            &state,
        )
        .unwrap();
        let out = execute(
            &Command::Get {
                key: Bytes::from_static(b"k"),
            },
            &state,
        )
        .unwrap();
        assert_eq!(out.reply, Frame::bulk(Bytes::from_static(b"v")));
    }

    #[test]
    fn follower_rejects_local_writes() {
        let mut cfg = Config::from_args(&[]).unwrap();
        cfg.mode = crate::config::Mode::Follower;
        let state = ServerState::new(cfg);
        let err = execute(
            &Command::Set {
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"v"),
                px: None,
            },
            &state,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Argument(_)));
    }

    #[test]
    fn apply_bypasses_follower_guard() {
        let mut cfg = Config::from_args(&[]).unwrap();
        cfg.mode = crate::config::Mode::Follower;
        let state = ServerState::new(cfg);
        apply(
            &Command::Set {
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"v"),
                px: None,
            },
            &state,
        )
        .unwrap();
        let out = apply(
            &Command::Get {
                key: Bytes::from_static(b"k"),
            },
            &state,
        )
        .unwrap();
        assert_eq!(out.reply, Frame::bulk(Bytes::from_static(b"v")));
    }

    #[test]
    fn wait_always_returns_zero() {
        let state = leader_state();
        let out = execute(
            &Command::Wait {
                numreplicas: 1,
                timeout_ms: 100,
            },
            &state,
        )
        .unwrap();
        assert_eq!(out.reply, Frame::Integer(0));
    }
}
