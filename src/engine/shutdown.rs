//! Cancellation broker: wires OS signals to a shared
//! [`CancellationToken`] (C10, §4.10).
//!
//! Replaces the original tool's mutable `running_state['is_running']`
//! flag shared across threads with a structured, cooperatively
//! awaited cancellation signal — the same primitive the corpus's
//! other MSSQL sync tool uses for exactly this purpose.

use tokio_util::sync::CancellationToken;

/// Spawn a task that cancels `token` on SIGINT or (on unix) SIGTERM,
/// and keeps watching afterward: a second signal while shutdown is
/// already in progress is logged each time it arrives rather than
/// just once, matching what repeated signals do to a process that
/// re-registers its handler instead of consuming it.
pub fn install_signal_handlers(token: CancellationToken) {
    tokio::spawn(async move {
        loop {
            wait_for_shutdown_signal().await;
            if token.is_cancelled() {
                tracing::warn!("shutdown already in progress; signal received again");
            } else {
                tracing::warn!("shutdown signal received; finishing in-flight batches before exiting");
                token.cancel();
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellation_token_reflects_cancel_call() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
