// Shutdown / Stop Token

use tokio::sync::watch;

/// Stop signal shared by long-running loops (server, sweeper, sampler)
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal (returns immediately if the sender is gone)
    pub async fn wait(&mut self) {
        if self.is_shutdown() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token holder
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());
        tx.shutdown();
        token.wait().await;
        assert!(token.is_shutdown());

        // already signalled: wait must not block again
        tokio::time::timeout(std::time::Duration::from_millis(100), token.wait())
            .await
            .expect("wait blocked after shutdown");
    }
}
