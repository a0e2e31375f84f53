/// Boxed error used where a collaborator or callback reports an opaque failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for failures of the wrapped persistence session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("A transaction is already in progress on this session")]
    TransactionInProgress,

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Blocking flush requires a multi-threaded tokio runtime")]
    BlockingUnavailable,

    #[error("Session error: {0}")]
    Other(#[source] BoxError),
}

impl SessionError {
    /// Wraps an arbitrary collaborator failure.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }
}

/// Result type for persistence session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Error type for operations on a `TransactionalContext`.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Transaction already open")]
    TransactionAlreadyOpen,

    #[error("Context has been disposed")]
    Disposed,

    #[error("Flush was cancelled")]
    Cancelled,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ContextError {
    /// True for misuse of the context's state machine, as opposed to a
    /// failure reported by the session or a cancelled flush.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::TransactionAlreadyOpen | Self::Disposed)
    }
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Error raised by a commit callback while the queue drains.
///
/// These never reach the caller of `commit`/`flush`; they are routed to the
/// context's error sink instead.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Commit callback failed: {0}")]
    Failed(#[source] BoxError),

    #[error("Commit callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

/// Result type returned by commit callbacks
pub type CallbackResult = Result<(), CallbackError>;
