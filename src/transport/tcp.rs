use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::directory::server::{Server, ServerEvent};
use crate::error::Result;
use crate::service::session::run_session;
use crate::utils::metrics::global_metrics;

/// Why the listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// CTRL+C or an external shutdown request.
    Signal,
    /// `system.server.shutdown`
    Shutdown,
    /// `system.server.restart`; the caller may start a new server.
    Restart,
}

/// Binds the configured address and serves until CTRL+C or a shutdown
/// command.
#[instrument(skip(server), fields(address = %server.settings().server.address))]
pub async fn start_server(server: Arc<Server>) -> Result<ShutdownReason> {
    let listener = TcpListener::bind(&server.settings().server.address).await?;

    // Create internal shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    // Set up ctrl-c handler that sends to our internal shutdown channel
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve(server, listener, shutdown_rx).await
}

/// Accept loop on an already bound listener, with an external shutdown
/// channel.
#[instrument(skip_all)]
pub async fn serve(
    server: Arc<Server>,
    listener: TcpListener,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<ShutdownReason> {
    let local = listener.local_addr()?;
    info!(address = %local, "Listening");

    let max_connections = server.settings().server.max_connections;
    let active = Arc::new(AtomicUsize::new(0));
    let sessions = CancellationToken::new();
    let mut events = server.subscribe();

    let reason = loop {
        tokio::select! {
            // Check for shutdown signal from the provided shutdown_rx channel
            _ = shutdown_rx.recv() => break ShutdownReason::Signal,

            event = events.recv() => match event {
                Ok(ServerEvent::Shutdown { restart, grace }) => {
                    info!(restart, grace_secs = grace.as_secs(), "Shutdown requested");
                    tokio::time::sleep(grace).await;
                    break if restart { ShutdownReason::Restart } else { ShutdownReason::Shutdown };
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Server events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break ShutdownReason::Signal,
            },

            // Accept new connections
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        if active.load(Ordering::SeqCst) >= max_connections {
                            warn!(peer = %peer, max_connections, "Connection limit reached, refusing");
                            global_metrics().connection_error();
                            continue;
                        }
                        let _ = stream.set_nodelay(true);

                        active.fetch_add(1, Ordering::SeqCst);
                        global_metrics().connection_established();
                        debug!(peer = %peer, "Connection accepted");

                        let server = Arc::clone(&server);
                        let active = Arc::clone(&active);
                        let token = sessions.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = run_session(server, stream, peer.to_string(), token).await {
                                debug!(peer = %peer, error = %e, "Connection ended");
                            }

                            // Decrement connection counter when connection closes
                            active.fetch_sub(1, Ordering::SeqCst);
                            global_metrics().connection_closed();
                        });
                    }
                    Err(e) => {
                        global_metrics().connection_error();
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    };

    info!(?reason, "Shutting down server. Waiting for connections to close...");
    sessions.cancel();
    drain(&active, server.settings().server.shutdown_timeout).await;
    global_metrics().log_metrics();
    Ok(reason)
}

/// Waits for live sessions to finish, up to `timeout`.
async fn drain(active: &AtomicUsize, timeout: Duration) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let connections = active.load(Ordering::SeqCst);
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }
        tokio::select! {
            _ = &mut deadline => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}
