//! Lifecycle management.
//!
//! Shutdown signal fan-out and OS signal handling.

use tokio::sync::watch;
use tracing::{info, warn};

/// Owner of the shutdown channel
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn shutdown(&self) {
        info!("sending shutdown signal");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for SIGINT/SIGTERM (Ctrl+C elsewhere), then signal shutdown.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => info!("SIGINT received"),
                        _ = sigterm.recv() => info!("SIGTERM received"),
                    }
                }
                _ => {
                    warn!("failed to register signal handlers, falling back to Ctrl+C");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("failed to listen for Ctrl+C: {e}");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
            }
            info!("Ctrl+C received");
        }

        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let lm = LifecycleManager::new();
        let mut a = lm.subscribe();
        let mut b = lm.subscribe();
        lm.shutdown();
        a.changed().await.unwrap();
        b.changed().await.unwrap();
        assert!(*a.borrow());
        assert!(*b.borrow());
    }
}
