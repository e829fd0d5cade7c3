// src/core/errors.rs

//! The single error type threaded through the codec, command dispatch, and
//! replication code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Protocol error: {0}")]
    Malformed(String),

    #[error("{0}")]
    Argument(String),

    #[error("Unknown command")]
    UnknownCommand,

    #[error("failed to write to replica {0}: {1}")]
    ReplicaWrite(std::net::SocketAddr, String),

    #[error("peer reset or closed the connection")]
    PeerReset,

    #[error("replication handshake with {0} failed: {1}")]
    Handshake(std::net::SocketAddr, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Renders this error the way it appears as a wire `Error` frame payload.
    pub fn as_reply_text(&self) -> String {
        match self {
            StoreError::UnknownCommand => "Unknown command".to_string(),
            StoreError::Argument(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
