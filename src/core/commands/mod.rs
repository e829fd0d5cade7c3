// src/core/commands/mod.rs

//! Parses wire-level command arrays into a `Command`, and classifies each
//! variant along the three axes spec.md §4.3 defines: `propagated`,
//! `server_answer`, `replica_upgrade`. This replaces the teacher's
//! per-command-struct + bitflags + macro-generated-enum machinery with a
//! plain tagged enum, per spec.md §9's redesign note — the enum's `match`
//! arms below *are* the table.

use bytes::Bytes;

use crate::core::errors::StoreError;
use crate::core::protocol::Frame;

pub(crate) mod exec;
pub use exec::{apply, execute, ExecOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Echo {
        value: Bytes,
    },
    Set {
        key: Bytes,
        value: Bytes,
        px: Option<i64>,
    },
    Get {
        key: Bytes,
    },
    Info,
    /// `REPLCONF listening-port <p>` — handled specially by the connection
    /// handler (replica registration), never through `execute`.
    ReplconfListeningPort {
        port: u16,
    },
    /// `REPLCONF capa <c>`.
    ReplconfCapa,
    /// `REPLCONF GETACK *`.
    ReplconfGetAck,
    /// Handled specially by the connection handler (snapshot handoff),
    /// never through `execute`.
    Psync {
        replid: String,
        offset: i64,
    },
    Wait {
        numreplicas: i64,
        timeout_ms: i64,
    },
    Unknown {
        name: String,
    },
}

impl Command {
    /// If true and we are leader, the original request bytes are sent
    /// verbatim to every replica after the local reply is produced.
    pub fn propagated(&self) -> bool {
        matches!(self, Command::Set { .. })
    }

    /// If true the reply must be sent even on the leader->follower stream,
    /// where replies are otherwise suppressed.
    pub fn server_answer(&self) -> bool {
        matches!(self, Command::ReplconfGetAck)
    }

    /// If true the connection that issued this command is registered as a
    /// replica sink.
    pub fn replica_upgrade(&self) -> bool {
        matches!(self, Command::ReplconfListeningPort { .. })
    }

    /// Command name as it would be echoed back in argument-count errors,
    /// uppercased the way spec.md §4.3's reply text shows it.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Echo { .. } => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Info => "INFO",
            Command::ReplconfListeningPort { .. }
            | Command::ReplconfCapa
            | Command::ReplconfGetAck => "REPLCONF",
            Command::Psync { .. } => "PSYNC",
            Command::Wait { .. } => "WAIT",
            Command::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// Parses a decoded `Array` of `BulkString`s into a `Command`. Per spec.md
/// §3, element 0 is the (case-insensitive) command name.
pub fn parse(frame: &Frame) -> Result<Command, StoreError> {
    let Frame::Array(items) = frame else {
        return Err(StoreError::Malformed(
            "expected an array frame for a command".into(),
        ));
    };
    let mut args = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Frame::BulkString(Some(b)) => args.push(b.clone()),
            _ => {
                return Err(StoreError::Malformed(
                    "command array elements must be bulk strings".into(),
                ));
            }
        }
    }
    if args.is_empty() {
        return Err(StoreError::Malformed("empty command array".into()));
    }

    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let rest = &args[1..];

    match name.as_str() {
        "PING" => Ok(Command::Ping),
        "ECHO" => {
            let value = require_arg(rest, 0, "ECHO")?;
            Ok(Command::Echo { value })
        }
        "SET" => parse_set(rest),
        "GET" => {
            let key = require_arg(rest, 0, "GET")?;
            Ok(Command::Get { key })
        }
        "INFO" => {
            require_arg(rest, 0, "INFO")?;
            Ok(Command::Info)
        }
        "REPLCONF" => parse_replconf(rest),
        "PSYNC" => parse_psync(rest),
        "WAIT" => parse_wait(rest),
        other => Ok(Command::Unknown {
            name: other.to_string(),
        }),
    }
}

fn require_arg(args: &[Bytes], idx: usize, cmd: &str) -> Result<Bytes, StoreError> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| StoreError::Argument(format!("{cmd} command requires more arguments")))
}

fn parse_set(args: &[Bytes]) -> Result<Command, StoreError> {
    if args.len() < 2 {
        return Err(StoreError::Argument(
            "SET command requires a key and a value".into(),
        ));
    }
    let key = args[0].clone();
    let value = args[1].clone();
    let mut px = None;

    let mut i = 2;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "PX" => {
                let ms_text = args.get(i + 1).ok_or_else(|| {
                    StoreError::Argument("SET command requires a value for PX".into())
                })?;
                let ms: i64 = std::str::from_utf8(ms_text)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| StoreError::Argument("PX requires a positive integer".into()))?;
                px = Some(crate::core::keyspace::now_ms() + ms);
                i += 2;
            }
            other => {
                return Err(StoreError::Argument(format!(
                    "SET command does not support option {other}"
                )));
            }
        }
    }

    Ok(Command::Set { key, value, px })
}

fn parse_replconf(args: &[Bytes]) -> Result<Command, StoreError> {
    if args.is_empty() {
        return Err(StoreError::Argument(
            "REPLCONF command requires more arguments".into(),
        ));
    }
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_lowercase();
    match sub.as_str() {
        "listening-port" => {
            let port_text = require_arg(args, 1, "REPLCONF")?;
            let port: u16 = std::str::from_utf8(&port_text)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| StoreError::Argument("invalid listening-port value".into()))?;
            Ok(Command::ReplconfListeningPort { port })
        }
        "capa" => Ok(Command::ReplconfCapa),
        "getack" => Ok(Command::ReplconfGetAck),
        _ => Err(StoreError::Argument(format!(
            "unsupported REPLCONF subcommand {sub}"
        ))),
    }
}

fn parse_psync(args: &[Bytes]) -> Result<Command, StoreError> {
    let replid = args
        .first()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_else(|| "?".to_string());
    let offset = args
        .get(1)
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(-1);
    Ok(Command::Psync { replid, offset })
}

fn parse_wait(args: &[Bytes]) -> Result<Command, StoreError> {
    if args.len() < 2 {
        return Err(StoreError::Argument(
            "WAIT command requires numreplicas and timeout".into(),
        ));
    }
    let numreplicas = std::str::from_utf8(&args[0])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Argument("WAIT numreplicas must be an integer".into()))?;
    let timeout_ms = std::str::from_utf8(&args[1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Argument("WAIT timeout must be an integer".into()))?;
    Ok(Command::Wait {
        numreplicas,
        timeout_ms,
    })
}
