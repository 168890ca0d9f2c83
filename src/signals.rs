use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Graceful shutdown (drain connections, stop the worker, finish background tasks)
    Graceful,
}

/// Create the shutdown channel shared by the server, the drain worker and tests
pub fn shutdown_channel() -> broadcast::Sender<ShutdownSignal> {
    let (shutdown_tx, _) = broadcast::channel(16);
    shutdown_tx
}

/// Setup signal handlers for the server
///
/// SIGTERM and SIGINT are turned into a [`ShutdownSignal::Graceful`] on
/// `shutdown_tx`. Returns the join handle of the listening task.
#[cfg(unix)]
pub fn setup_signal_handlers(
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown");
            }
        }
        let _ = shutdown_tx.send(ShutdownSignal::Graceful);
    })
}

/// Windows: only Ctrl+C is supported
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = shutdown_tx.send(ShutdownSignal::Graceful);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_reaches_every_subscriber() {
        let shutdown_tx = shutdown_channel();
        let handle = setup_signal_handlers(shutdown_tx.clone());

        let mut server_rx = shutdown_tx.subscribe();
        let mut worker_rx = shutdown_tx.subscribe();

        shutdown_tx.send(ShutdownSignal::Graceful).unwrap();

        assert_eq!(server_rx.recv().await.unwrap(), ShutdownSignal::Graceful);
        assert_eq!(worker_rx.recv().await.unwrap(), ShutdownSignal::Graceful);
        handle.abort();
    }
}
