// Execution Cancellation Token

use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation signal for one execution
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    outcome: Arc<watch::Sender<Option<bool>>>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for cancellation. Never resolves if the handle is dropped unsignalled.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Report whether acting on the cancellation skipped any queued target
    pub fn acknowledge(&self, skipped_any: bool) {
        self.outcome.send_replace(Some(skipped_any));
    }
}

/// Sending half, kept by the execution service
pub struct CancelHandle {
    tx: watch::Sender<bool>,
    outcome: watch::Receiver<Option<bool>>,
}

impl CancelHandle {
    /// Request cancellation (idempotent)
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Request cancellation and get a receipt for the dispatcher's answer
    pub fn request(&self) -> CancelReceipt {
        self.cancel();
        CancelReceipt {
            outcome: self.outcome.clone(),
        }
    }
}

/// Pending answer to a cancellation request
pub struct CancelReceipt {
    outcome: watch::Receiver<Option<bool>>,
}

impl CancelReceipt {
    /// `true` if the dispatcher skipped at least one queued target. `false`
    /// when every target had already started, or dispatch ended first.
    pub async fn skipped_any(mut self) -> bool {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Create a cancellation pair
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    let (outcome_tx, outcome_rx) = watch::channel(None);
    (
        CancelHandle {
            tx,
            outcome: outcome_rx,
        },
        CancelToken {
            rx,
            outcome: Arc::new(outcome_tx),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, mut token) = cancel_channel();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            token.is_cancelled()
        });
        handle.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_is_not_cancellation() {
        let (handle, mut token) = cancel_channel();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_receipt_carries_acknowledgement() {
        let (handle, token) = cancel_channel();
        let receipt = handle.request();
        assert!(token.is_cancelled());
        token.acknowledge(true);
        assert!(receipt.skipped_any().await);
    }

    #[tokio::test]
    async fn test_receipt_is_false_when_dispatch_ends_unacknowledged() {
        let (handle, token) = cancel_channel();
        let receipt = handle.request();
        drop(token);
        assert!(!receipt.skipped_any().await);
    }
}
