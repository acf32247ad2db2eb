//! Termination signal wiring shared by the binaries.

use tokio::sync::broadcast;

/// Spawn a task that broadcasts `()` once on Ctrl-C (and SIGTERM on unix).
pub fn spawn_signal_listener(tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = tx.send(());
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            let ctrl_c_error = tokio::select! {
                res = tokio::signal::ctrl_c() => res.err(),
                _ = term.recv() => None,
            };
            if let Some(e) = ctrl_c_error {
                tracing::warn!(error = %e, "Ctrl-C listener failed; waiting for SIGTERM only");
                term.recv().await;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM listener unavailable; Ctrl-C only");
            ctrl_c_or_never().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

async fn ctrl_c_or_never() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
