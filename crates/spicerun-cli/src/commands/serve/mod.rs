//! WebSocket job server.
//!
//! Hosts a scheduler and exposes its job interface to remote clients.
//!
//! ## Protocol
//!
//! Requests are JSON objects with a `type` field:
//!
//! - `submit`: Queue a job
//!   ```json
//!   {"type": "submit", "schematic": "/abs/rc.asc", "backend": "ltspice", "overrides": {"R1": "2k"}}
//!   ```
//! - `status`, `fetch`, `cancel`: Act on one job
//!   ```json
//!   {"type": "status", "job_id": "5b0f5d3e-0c1e-4a39-9a51-3c7e54b1c2d0"}
//!   ```
//! - `list`, `backends`: Server-wide queries
//!
//! Every response is `{"success": bool, "result": ..., "errors": [...]}`.
//! Errors from the job interface carry the structured error under `detail`.

mod handler;
mod types;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

use spicerun_scheduler::SchedulerHandle;

pub use handler::{dispatch, handle_request};
pub use types::{error_codes, ServeRequest, ServeResponse, WireError};

use super::run::start_scheduler;
use crate::config::FileConfig;

/// Default port for the WebSocket server.
pub const DEFAULT_PORT: u16 = 9124;

/// Run the WebSocket job server.
///
/// # Arguments
/// * `port` - Port to listen on
/// * `config_path` - Optional config file
///
/// # Returns
/// Exit code: 0 on clean shutdown, 1 on error
pub fn run(port: u16, config_path: Option<&str>) -> Result<ExitCode> {
    let config = FileConfig::load(config_path)?.scheduler_config();
    let rt = super::scheduler_runtime()?;

    rt.block_on(async move {
        let scheduler = start_scheduler(config)?;

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        eprintln!("spicerun job server listening on ws://{}", addr);
        eprintln!("Press Ctrl+C to shutdown");

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                eprintln!("\nShutting down...");
                let _ = signal_tx.send(());
            }
        });

        serve(listener, scheduler.handle(), shutdown_tx).await;
        scheduler.shutdown().await;
        eprintln!("Server shutdown complete");
        Ok(ExitCode::SUCCESS)
    })
}

/// Accepts connections on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    handle: SchedulerHandle,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        tracing::info!(%peer_addr, "new connection");
                        tokio::spawn(handle_connection(
                            stream,
                            peer_addr,
                            handle.clone(),
                            shutdown.subscribe(),
                        ));
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handle: SchedulerHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer_addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg_opt = read.next() => {
                match msg_opt {
                    Some(Ok(msg)) => {
                        if let Some(response) = handler::process_message(&handle, msg).await {
                            if let Err(e) = write.send(Message::Text(response)).await {
                                tracing::warn!(%peer_addr, error = %e, "send failed");
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%peer_addr, error = %e, "receive failed");
                        break;
                    }
                    None => break,
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::info!(%peer_addr, "connection closed");
}
