//! SIGINT / SIGTERM handling.
//!
//! A signal cancels the shared token. Commands check it between listing
//! pages, deletions, job submissions and status polls, and stop with
//! `BackupError::Cancelled`. Jobs already submitted keep running in Dataflow.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` when the process receives SIGINT or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = wait_for_signal() => {}
        }

        info!("Stopping; submitted jobs keep running in Dataflow");
        token.cancel();
    })
}

/// Resolves when a signal arrives. Never resolves for a signal whose handler
/// could not be installed.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
