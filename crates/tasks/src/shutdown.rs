use tokio::sync::watch;

/// Shared shutdown trigger. Flips once and stays flipped; cloning shares the
/// same underlying channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Trigger shutdown. Idempotent.
    pub fn send(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown trigger, handed to tasks.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Non-blocking check, for use inside tick loops.
    pub fn should_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered (immediately if it already
    /// was).
    pub async fn wait_for_shutdown(mut self) {
        // Err means the sender is gone, which we treat the same as shutdown.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
