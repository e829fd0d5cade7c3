// src/server/context.rs

//! Bundles everything the accept loop needs: the bound listener and the
//! shared server state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::core::state::ServerState;

pub struct ServerContext {
    pub listener: TcpListener,
    pub state: Arc<ServerState>,
}

/// Binds the listening socket and builds the shared state. Does not start
/// the follower link or the accept loop — `server::run` does that once this
/// returns.
pub async fn setup(config: Config) -> Result<ServerContext> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let state = Arc::new(ServerState::new(config));
    Ok(ServerContext { listener, state })
}
