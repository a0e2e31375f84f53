use async_trait::async_trait;

use crate::SessionResult;

/// Transaction isolation level requested when a transaction is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The statement that applies this level to the current transaction.
    pub fn set_statement(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Handle to a transaction opened on a `PersistenceSession`.
///
/// Dropping a handle that was neither committed nor rolled back must abandon
/// the transaction: the store discards its changes.
#[async_trait]
pub trait ActiveTransaction: Send {
    /// Commit the transaction.
    ///
    /// On failure the handle stays usable so the caller can still roll back.
    /// Whether a retried commit can succeed depends on the implementation; the
    /// session must not run flushes outside this transaction until it has been
    /// committed or rolled back.
    async fn commit(&mut self) -> SessionResult<()>;

    /// Roll the transaction back.
    async fn rollback(&mut self) -> SessionResult<()>;
}

/// A session that tracks pending changes and flushes them transactionally.
///
/// The session is the collaborator wrapped by `TransactionalContext`; it owns
/// change tracking and connections, while the context owns transaction
/// bookkeeping and commit callbacks.
#[async_trait]
pub trait PersistenceSession: Send {
    /// Open a transaction, optionally at a specific isolation level.
    ///
    /// Fails if a transaction is already open on this session.
    async fn begin(
        &mut self,
        isolation: Option<IsolationLevel>,
    ) -> SessionResult<Box<dyn ActiveTransaction>>;

    /// Send pending changes to the store, blocking the calling thread.
    ///
    /// Returns the number of rows affected.
    fn flush(&mut self) -> SessionResult<u64>;

    /// Send pending changes to the store.
    ///
    /// Returns the number of rows affected. Dropping the returned future
    /// before it completes aborts the flush.
    async fn flush_async(&mut self) -> SessionResult<u64>;

    /// Release the session's underlying resources.
    async fn close(&mut self) -> SessionResult<()>;
}
