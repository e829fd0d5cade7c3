// src/config.rs

//! Server configuration, built directly from the two CLI flags this store
//! accepts — no config file, matching the External Interfaces this crate
//! actually exposes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Leader,
    Follower,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub listen_addr: SocketAddr,
    /// Set when `--replicaof "<host> <port>"` was given.
    pub leader_addr: Option<SocketAddr>,
}

impl Config {
    /// Parses `--port <int>` and `--replicaof "<host> <port>"` the same
    /// manual way the teacher's own `main.rs` parses its flags: no `clap`,
    /// just `env::args()` plus position scanning.
    pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let port = match find_flag_value(args, "--port") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("--port must be a valid port number, got {v:?}"))?,
            None => 6379,
        };
        let listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);

        let leader_addr = match find_flag_value(args, "--replicaof") {
            Some(v) => Some(parse_replicaof(v)?),
            None => None,
        };

        let mode = if leader_addr.is_some() {
            Mode::Follower
        } else {
            Mode::Leader
        };

        Ok(Config {
            mode,
            listen_addr,
            leader_addr,
        })
    }
}

fn find_flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

/// Parses the single space-separated `"<host> <port>"` value spec.md §6
/// mandates for `--replicaof`.
fn parse_replicaof(value: &str) -> anyhow::Result<SocketAddr> {
    let mut parts = value.split_whitespace();
    let host = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--replicaof requires \"<host> <port>\", got {value:?}"))?;
    let port = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--replicaof requires \"<host> <port>\", got {value:?}"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow::anyhow!("--replicaof port must be numeric, got {port:?}"))?;
    let ip: IpAddr = if host == "localhost" {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse()
            .map_err(|_| anyhow::anyhow!("--replicaof host must be an IP address, got {host:?}"))?
    };
    Ok(SocketAddr::new(ip, port))
}
