//! Orderly shutdown of the agent's run loop
//!
//! The controller owns the stop trigger outright (a broadcast channel), so
//! the signal handler never captures a reference into the reactor. It is
//! constructed after the reactors and installed strictly before the run
//! loop starts; the handler's sole effect is requesting loop exit. All
//! cleanup is destructor-driven.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

/// Owns the broadcast channel that requests the run loop to stop.
#[derive(Debug)]
pub struct ShutdownController {
    sender: broadcast::Sender<()>,
}

/// Cloneable trigger for requesting a stop from outside the agent.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Request an orderly stop. Queued work may still drain before the
    /// loop exits.
    pub fn request_stop(&self) {
        // Send only fails when no loop is listening anymore.
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(4);
        Self { sender }
    }

    /// Subscribe a loop to the stop request.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.sender.clone(),
        }
    }

    /// Install the termination-signal listener on the current reactor.
    ///
    /// Must be called from inside the primary reactor, after it exists and
    /// before the run loop blocks on it.
    #[cfg(unix)]
    pub fn install(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let sender = self.sender.clone();
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = terminate.recv() => {
                    info!(signal = "SIGTERM", "Termination signal received");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(signal = "interrupt", "Termination signal received");
                }
            }
            let _ = sender.send(());
        });

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install(&self) -> Result<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = "interrupt", "Termination signal received");
            }
            let _ = sender.send(());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_stop_wakes_subscribers() {
        let controller = ShutdownController::new();
        let mut first = controller.subscribe();
        let mut second = controller.subscribe();

        controller.handle().request_stop();

        first.recv().await.unwrap();
        second.recv().await.unwrap();
    }

    #[tokio::test]
    async fn stop_request_without_subscribers_is_harmless() {
        let controller = ShutdownController::new();
        controller.handle().request_stop();
    }

    #[tokio::test]
    async fn subscribers_added_after_stop_do_not_see_it() {
        let controller = ShutdownController::new();
        controller.handle().request_stop();

        let mut late = controller.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
