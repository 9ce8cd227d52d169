//! Cooperative stop signal for capture loops

use std::sync::Arc;
use tokio::sync::watch;

/// Clones share one flag; once stopped it stays stopped
#[derive(Debug, Clone)]
pub struct StopToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `stop` has been called on any clone
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // the sender lives in self, so wait_for cannot fail
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
