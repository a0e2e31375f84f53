use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::callbacks::{CallbackQueue, CommitCallback, ErrorSink};
use crate::cancel::CancelSignal;
use crate::session::{ActiveTransaction, IsolationLevel, PersistenceSession};
use crate::{CallbackError, ContextError, ContextResult, SessionError};

/// Commit callback registered on a `TransactionalContext` over session `S`.
pub type ContextCallback<S> = Arc<dyn CommitCallback<TransactionalContext<S>>>;

/// Opaque token identifying the transaction opened by `begin_transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct OpenTransaction {
    id: TransactionId,
    handle: Box<dyn ActiveTransaction>,
}

/// Unit of work over a `PersistenceSession`.
///
/// The context opens, commits and rolls back at most one transaction at a
/// time, sums the rows affected by every flush inside that transaction, and
/// fires registered commit callbacks exactly once after a successful commit.
/// A flush outside a transaction is its own implicit commit and fires the
/// callbacks immediately with that flush's count.
///
/// A context models a single logical unit of work and is not meant to be
/// shared between tasks; every mutating operation takes `&mut self`.
pub struct TransactionalContext<S: PersistenceSession> {
    session: Option<S>,
    transaction: Option<OpenTransaction>,
    accumulated: u64,
    disposed: bool,
    callbacks: CallbackQueue<Self>,
}

impl<S: PersistenceSession> TransactionalContext<S> {
    /// Create a context that owns `session` until it is disposed.
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
            transaction: None,
            accumulated: 0,
            disposed: false,
            callbacks: CallbackQueue::new(),
        }
    }

    /// The wrapped session. Direct use of the session does not touch the
    /// context's count or transaction state.
    pub fn session(&self) -> ContextResult<&S> {
        self.session.as_ref().ok_or(ContextError::Disposed)
    }

    /// Mutable access to the wrapped session, e.g. to stage changes.
    pub fn session_mut(&mut self) -> ContextResult<&mut S> {
        self.session.as_mut().ok_or(ContextError::Disposed)
    }

    /// True while a transaction opened by `begin_transaction` is open.
    pub fn is_in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Token of the open transaction, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(|open| open.id)
    }

    /// True once `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Rows affected so far in the current unit of work.
    pub fn accumulated_count(&self) -> u64 {
        self.accumulated
    }

    /// Number of callbacks waiting for the next commit.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Open a transaction on the session.
    pub async fn begin_transaction(&mut self) -> ContextResult<TransactionId> {
        self.open_transaction(None).await
    }

    /// Open a transaction at the given isolation level.
    pub async fn begin_transaction_with(
        &mut self,
        isolation: IsolationLevel,
    ) -> ContextResult<TransactionId> {
        self.open_transaction(Some(isolation)).await
    }

    async fn open_transaction(
        &mut self,
        isolation: Option<IsolationLevel>,
    ) -> ContextResult<TransactionId> {
        self.ensure_live()?;
        if self.transaction.is_some() {
            return Err(ContextError::TransactionAlreadyOpen);
        }

        let handle = self.session_mut()?.begin(isolation).await?;
        let id = TransactionId::new();
        self.accumulated = 0;
        self.transaction = Some(OpenTransaction { id, handle });
        debug!(transaction_id = %id, ?isolation, "transaction opened");
        Ok(id)
    }

    /// Commit the open transaction and fire the commit callbacks with the
    /// accumulated count. Does nothing when no transaction is open.
    ///
    /// If the session fails to commit, the transaction stays open and the
    /// callbacks stay registered until the caller retries or rolls back.
    pub async fn commit(&mut self) -> ContextResult<()> {
        self.ensure_live()?;
        let Some(open) = self.transaction.as_mut() else {
            return Ok(());
        };

        open.handle.commit().await?;
        let id = open.id;
        self.transaction = None;
        debug!(transaction_id = %id, accumulated = self.accumulated, "transaction committed");
        self.drain_callbacks();
        Ok(())
    }

    /// Roll back the open transaction and discard the commit callbacks
    /// without firing them. Does nothing when no transaction is open.
    pub async fn rollback(&mut self) -> ContextResult<()> {
        self.ensure_live()?;
        self.rollback_open().await?;
        Ok(())
    }

    async fn rollback_open(&mut self) -> Result<(), SessionError> {
        let Some(open) = self.transaction.as_mut() else {
            return Ok(());
        };

        open.handle.rollback().await?;
        let id = open.id;
        self.transaction = None;
        debug!(transaction_id = %id, discarded = self.callbacks.len(), "transaction rolled back");
        self.clear_callbacks();
        Ok(())
    }

    /// Flush pending changes, blocking the calling thread.
    ///
    /// Inside a transaction the affected rows are added to the accumulated
    /// count. Outside one the flush is its own commit: the count is replaced by
    /// this flush's rows and the commit callbacks fire immediately.
    pub fn flush(&mut self) -> ContextResult<u64> {
        self.ensure_live()?;
        let rows = self.session_mut()?.flush()?;
        Ok(self.complete_flush(rows))
    }

    /// Asynchronous form of [`flush`](Self::flush).
    pub async fn flush_async(&mut self) -> ContextResult<u64> {
        self.ensure_live()?;
        let rows = self.session_mut()?.flush_async().await?;
        Ok(self.complete_flush(rows))
    }

    /// Asynchronous flush that is abandoned once `cancel` fires.
    ///
    /// A cancelled flush leaves the count and the callbacks untouched.
    pub async fn flush_async_cancellable(&mut self, cancel: &mut CancelSignal) -> ContextResult<u64> {
        self.ensure_live()?;
        if cancel.is_cancelled() {
            return Err(ContextError::Cancelled);
        }

        let session = self.session.as_mut().ok_or(ContextError::Disposed)?;
        let rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("flush cancelled");
                return Err(ContextError::Cancelled);
            }
            result = session.flush_async() => result?,
        };
        Ok(self.complete_flush(rows))
    }

    fn complete_flush(&mut self, rows: u64) -> u64 {
        if self.transaction.is_some() {
            self.accumulated += rows;
            debug!(rows, accumulated = self.accumulated, "flush inside transaction");
        } else {
            self.accumulated = rows;
            debug!(rows, "flush committed implicitly");
            self.drain_callbacks();
        }
        rows
    }

    /// Register a commit callback. Returns false when it is already registered.
    pub fn register_callback(&mut self, callback: ContextCallback<S>) -> bool {
        self.callbacks.register(callback)
    }

    /// Remove a commit callback. Returns whether it was registered.
    pub fn unregister_callback(&mut self, callback: &ContextCallback<S>) -> bool {
        self.callbacks.unregister(callback)
    }

    /// Discard every registered callback and reset the accumulated count.
    pub fn clear_callbacks(&mut self) {
        self.accumulated = 0;
        self.callbacks.clear();
    }

    /// Install the sink that receives errors raised by commit callbacks.
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: Fn(CallbackError) + Send + Sync + 'static,
    {
        let sink: ErrorSink = Arc::new(sink);
        self.callbacks.set_error_sink(Some(sink));
    }

    /// Remove the error sink; callback failures are then only logged.
    pub fn clear_error_sink(&mut self) {
        self.callbacks.set_error_sink(None);
    }

    fn drain_callbacks(&mut self) {
        let affected = self.accumulated;
        let pending = self.callbacks.take();
        if !pending.is_empty() {
            let failures = self.callbacks.dispatch(&pending, &*self, affected);
            debug!(callbacks = pending.len(), failures, affected, "commit callbacks drained");
        }
        self.clear_callbacks();
    }

    /// Roll back any open transaction, discard the callbacks and close the
    /// session. Later calls do nothing.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned.
    pub async fn dispose(&mut self) -> ContextResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let mut first_error = None;
        if let Err(err) = self.rollback_open().await {
            warn!(error = %err, "rollback failed while disposing context");
            // Dropping the handle abandons the transaction.
            self.transaction = None;
            first_error = Some(err);
        }
        self.clear_callbacks();

        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close().await {
                warn!(error = %err, "session close failed while disposing context");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        debug!("context disposed");

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn ensure_live(&self) -> ContextResult<()> {
        if self.disposed {
            Err(ContextError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl<S: PersistenceSession> Drop for TransactionalContext<S> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(open) = self.transaction.take() {
            warn!(transaction_id = %open.id, "context dropped with an open transaction; abandoning it");
        }
        self.callbacks.clear();
    }
}

impl<S: PersistenceSession> fmt::Debug for TransactionalContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalContext")
            .field("transaction_id", &self.transaction_id())
            .field("accumulated", &self.accumulated)
            .field("callbacks", &self.callbacks.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
