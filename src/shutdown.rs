//! Cooperative shutdown wiring
//!
//! SIGINT and SIGTERM both set the shared stop flag; workers check it on
//! wake from any sleep and exit instead of looping. Mid-flight requests
//! complete naturally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Spawn a background task that sets `stop` when the process receives a
/// shutdown signal.
pub fn spawn_stop_on_signal(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if wait_for_signal().await {
            info!("Shutdown signal received, stopping gracefully");
            stop.store(true, Ordering::Relaxed);
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Could not register SIGTERM handler, SIGINT only");
            return tokio::signal::ctrl_c().await.is_ok();
        }
    };

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => interrupted.is_ok(),
        _ = term.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}
