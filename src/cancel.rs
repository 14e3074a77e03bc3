use std::sync::Arc;

use tokio::sync::watch;

/// One-shot cancellation cell for an in-flight operation
///
/// A handle can be cloned into whatever task needs to cancel the operation.
/// Cancellation is idempotent: calling [`cancel`](CancelHandle::cancel) on an
/// already-canceled (or completed) operation has no further effect and never
/// resolves a waiter twice.
///
/// # Examples
///
/// ```rust
/// use probex::CancelHandle;
///
/// let cancel = CancelHandle::new();
/// assert!(!cancel.is_canceled());
/// cancel.cancel();
/// cancel.cancel(); // no-op
/// assert!(cancel.is_canceled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a new, not-yet-canceled handle
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until cancellation is requested
    ///
    /// Resolves immediately when the handle was already canceled.
    pub async fn canceled(&self) {
        let mut receiver = self.sender.subscribe();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_canceled());
        // A waiter registered after the fact still resolves exactly once.
        cancel.canceled().await;
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_cancel() {
        let cancel = CancelHandle::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.canceled().await;
                true
            })
        };
        cancel.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_not_canceled_by_default() {
        let cancel = CancelHandle::new();
        assert!(!cancel.is_canceled());
    }
}
