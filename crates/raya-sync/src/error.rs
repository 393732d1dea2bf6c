//! Lock errors

use crate::context::ContextId;

/// Errors that can occur when using a lock or condition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Release or condition operation by a context that does not hold the lock
    #[error("Context {caller} does not hold the lock (owner: {owner:?})")]
    NotOwner {
        /// The offending caller
        caller: ContextId,
        /// The owner at the time of the call
        owner: Option<ContextId>,
    },

    /// The blocking call was aborted by a cancellation signal
    #[error("Wait cancelled for context {0}")]
    Cancelled(ContextId),

    /// The lock variant cannot provide the requested capability
    #[error("Operation not supported: {0}")]
    CapabilityNotSupported(&'static str),

    /// The call would block forever on a lock the caller already holds
    #[error("Context {0} would deadlock on a lock it already holds")]
    Deadlock(ContextId),
}

/// Result of a lock operation
pub type LockResult<T> = Result<T, LockError>;
