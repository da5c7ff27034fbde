//! OS signal handling.
//!
//! SIGINT/SIGTERM trigger graceful shutdown. SIGHUP reloads routes from the
//! config file through the same path as the file watcher.

use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;

use crate::config::reload::Reloader;
use crate::lifecycle::shutdown::Shutdown;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received terminate signal, initiating graceful shutdown"),
    }
}

/// Trigger `shutdown` when the process is asked to stop.
pub fn spawn_shutdown_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    })
}

/// Reload routes on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_reload_on_hangup(reloader: Arc<Reloader>, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("Received SIGHUP, reloading routes");
                    let reloader = Arc::clone(&reloader);
                    // Reload reads the file; keep it off the async workers.
                    let _ = tokio::task::spawn_blocking(move || reloader.reload()).await;
                }
                _ = stop.recv() => break,
            }
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_reload_on_hangup(_reloader: Arc<Reloader>, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = stop.recv().await;
    })
}
