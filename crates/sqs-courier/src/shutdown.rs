//! Cooperative shutdown for consumer loops.

use std::sync::Arc;
use tokio::sync::watch;

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;

/// Create a connected trigger and signal
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownTrigger {
            sender: Arc::new(sender),
        },
        ShutdownSignal {
            receiver,
            _keepalive: None,
        },
    )
}

/// Requests that consumer loops stop
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Signal shutdown to every connected signal; idempotent
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Observed by consumer loops between cycles
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
    // Keeps the channel open for signals that never fire
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _keepalive: Some(Arc::new(sender)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown has been requested.
    ///
    /// Never resolves if every trigger is dropped without firing.
    pub async fn triggered(&mut self) {
        let closed = self.receiver.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::never()
    }
}
