// src/server/connection_loop.rs

//! The main accept loop: take connections, hand each to
//! `core::connection::handle_connection`, and shut down cleanly on
//! SIGINT/SIGTERM.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::context::ServerContext;
use crate::config::Mode;
use crate::core::connection::handle_connection;
use crate::core::replication::follower;

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        }
    }
    #[cfg(windows)]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, shutting down");
    }
}

/// Runs until a shutdown signal arrives, accepting connections and spawning
/// `handle_connection` for each one.
pub async fn run(ctx: ServerContext) {
    let ServerContext { listener, state } = ctx;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut client_tasks = JoinSet::new();

    if let Mode::Follower = state.mode() {
        let leader_addr = state
            .config
            .leader_addr
            .expect("Mode::Follower implies leader_addr is set");
        let follower_state = state.clone();
        let follower_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            follower::run(leader_addr, follower_state, follower_shutdown_rx).await;
        });
    }

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => break,

            res = listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!(%addr, "accepted connection");
                        let state = state.clone();
                        client_tasks.spawn(async move {
                            if let Err(e) = handle_connection(socket, addr, state).await {
                                warn!(%addr, error = %e, "connection terminated unexpectedly");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            },

            Some(res) = client_tasks.join_next(), if !client_tasks.is_empty() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("a client handler panicked: {e:?}");
                    }
                }
            },
        }
    }

    info!("shutting down, signaling background tasks");
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(Duration::from_secs(5), client_tasks.shutdown())
        .await
        .is_err()
    {
        warn!("timed out waiting for connections to close cleanly");
    }
    info!("shutdown complete");
}
