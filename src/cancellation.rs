use tokio::sync::watch;

/// Cooperative cancellation signal handed to every catalog query.
///
/// The core never spawns background work of its own; cancellation exists so
/// the caller can abort a long-running introspection promptly, for example
/// when the process receives a termination signal mid-validation.
#[derive(Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelToken {
    /// A token pair. Dropping the handle without calling `cancel` leaves the
    /// token permanently un-cancelled.
    pub fn new() -> (CancelHandle, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, CancelToken { receiver })
    }

    /// A token that can never fire, for callers that do not need cancellation.
    pub fn never() -> CancelToken {
        let (sender, receiver) = watch::channel(false);
        // Keep the sender alive forever so the channel never closes.
        std::mem::forget(sender);
        CancelToken { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when the handle signals cancellation. Never resolves for a
    /// `never` token.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender dropped without cancelling; park forever.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}
