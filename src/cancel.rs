use tokio::sync::watch;

/// Create a linked cancellation handle and signal.
///
/// The signal can be cloned and handed to any number of flushes; cancelling
/// the handle aborts every flush still waiting on the session.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Sending side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation of every flush waiting on a linked signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
