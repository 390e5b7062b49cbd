//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Server tuning, auth, bus subscribers and the negotiation policy are
/// swapped live. The listen address and the pricing source only change on
/// restart. A file that fails to load or validate leaves the running
/// configuration untouched.
///
/// Returns a Notify that stops the handler.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
) -> std::io::Result<Arc<Notify>> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => {
                            {
                                let mut server = state.config.server.write().await;
                                if server.listen != loaded.server.listen {
                                    tracing::warn!(
                                        current = %server.listen,
                                        requested = %loaded.server.listen,
                                        "Listen address change requires a restart"
                                    );
                                }
                                let listen = server.listen;
                                *server = loaded.server;
                                server.listen = listen;
                            }
                            *state.config.auth.write().await = loaded.auth;
                            *state.config.bus.write().await = loaded.bus;
                            state.config.policy.update(loaded.policy).await;
                            tracing::info!(
                                policy_version = state.config.policy.version(),
                                "Configuration reloaded successfully"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload configuration, keeping the current one");
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    Ok(shutdown_notify)
}
