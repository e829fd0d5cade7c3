// src/main.rs

//! Entry point: parse CLI flags, set up structured logging, run the server.

use std::env;

use anyhow::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;
use wisprdb::config::Config;
use wisprdb::server;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .init();

    let config = Config::from_args(&args)?;

    if let Err(e) = server::run(config).await {
        error!("server error: {e}");
        return Err(e);
    }
    Ok(())
}
