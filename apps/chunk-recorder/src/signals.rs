use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::recording::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Terminate,
    Interrupt,
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> std::io::Result<SignalType> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result.map(|_| SignalType::Interrupt),
        _ = sigterm.recv() => Ok(SignalType::Terminate),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> std::io::Result<SignalType> {
    signal::ctrl_c().await.map(|_| SignalType::Interrupt)
}

/// Request a clean stop of the session on the first shutdown signal.
pub fn spawn_shutdown_listener(handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received {:?}, finishing current segment", signal);
                if !handle.request_shutdown() {
                    debug!("Session already ended");
                }
            }
            Err(e) => warn!("Failed to install signal handlers: {}", e),
        }
    })
}
