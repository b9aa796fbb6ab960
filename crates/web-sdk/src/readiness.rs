//! One-shot readiness signal passed between pipeline stages.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle that resolves exactly once. Resolving twice is a no-op.
#[derive(Clone, Debug)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// A handle that is already resolved; the seed of every pipeline.
    pub fn resolved() -> Self {
        let readiness = Self::new();
        readiness.resolve();
        readiness
    }

    /// Returns `true` only for the call that performed the resolution.
    pub fn resolve(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any handle, so this cannot fail while
        // `self` is borrowed.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
