//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Broadcasts the shutdown request to every long-running task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Request shutdown; later calls are no-ops
    pub fn trigger(&self, reason: &str) {
        if !self.sender.send_replace(true) {
            info!("Shutdown requested: {}", reason);
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        let mut receiver = self.subscribe();
        // The sender lives in self, so this only returns once the flag is set
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handlers(shutdown: ShutdownHandle) -> Result<()> {
    // Handle Ctrl+C (SIGINT)
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                return;
            }
            shutdown.trigger("Ctrl+C signal received");
        });
    }

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, flag.clone())
            .context("Failed to register SIGTERM handler")?;

        // Poll for signal
        tokio::spawn(async move {
            loop {
                if flag.load(Ordering::Relaxed) {
                    shutdown.trigger("SIGTERM signal received");
                    break;
                }
                if shutdown.is_triggered() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_subscribers() {
        let shutdown = ShutdownHandle::new();
        let mut receiver = shutdown.subscribe();
        assert!(!shutdown.is_triggered());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        shutdown.trigger("test");
        shutdown.trigger("again");

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(*receiver.borrow_and_update());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let shutdown = ShutdownHandle::new();
        shutdown.trigger("test");
        tokio_test::block_on(shutdown.wait());
    }
}
