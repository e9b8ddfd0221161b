/*!
 * Batch cancellation.
 *
 * A batch hands clones of one `CancellationSignal` to its workers. Workers check it
 * between attempts and race it against backoff sleeps and provider calls.
 */

use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation shared between a batch and its workers.
///
/// Clones observe the same flag; once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation of everything watching this signal
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender is gone without cancelling, so it never will
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
