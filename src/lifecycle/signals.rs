//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to [`SignalEvent`]s for the main loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a policy reload, not shutdown
//! - On non-Unix targets only Ctrl+C is observed

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Re-read the config file and swap in its policy tables.
    Reload,
    /// Begin graceful shutdown.
    Terminate,
}

/// Spawn a task that forwards OS signals as [`SignalEvent`]s.
///
/// The task ends after the first `Terminate` or when the receiver is dropped.
pub fn spawn_signal_listener() -> mpsc::UnboundedReceiver<SignalEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(e) = listen(tx).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });
    rx
}

#[cfg(unix)]
async fn listen(tx: mpsc::UnboundedSender<SignalEvent>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let event = tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received");
                SignalEvent::Reload
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                SignalEvent::Terminate
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received");
                SignalEvent::Terminate
            }
        };

        if tx.send(event).is_err() || event == SignalEvent::Terminate {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn listen(tx: mpsc::UnboundedSender<SignalEvent>) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received");
    let _ = tx.send(SignalEvent::Terminate);
    Ok(())
}
