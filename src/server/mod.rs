// src/server/mod.rs

use anyhow::Result;

use crate::config::Config;

mod connection_loop;
mod context;

/// The main server startup function: bind the listener, build shared state,
/// then run the accept loop until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let server_context = context::setup(config).await?;
    connection_loop::run(server_context).await;
    Ok(())
}
