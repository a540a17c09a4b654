use crate::traits::{ContextId, ListenerId};

/// Errors that can occur in transport and context discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The context does not exist (never created, or already torn down).
    #[error("unknown context {0}")]
    UnknownContext(ContextId),

    /// The listener id is not registered.
    #[error("unknown listener {0}")]
    UnknownListener(ListenerId),

    /// The context exists but refuses inspection (isolation restriction).
    #[error("access denied to context {0}")]
    AccessDenied(ContextId),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
