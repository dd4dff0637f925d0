//! Error types for action invocation.

use std::sync::Arc;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::tree::Tree;

/// Failure raised by, or on behalf of, an action.
///
/// Cloneable so the wrapper can record it in its status and still hand it
/// to the caller.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// The in-flight call was cancelled. Only [`CancelToken::Sentinel`] is
    /// silently dropped by the wrapper.
    #[error("action cancelled ({0})")]
    Cancelled(CancelToken),

    /// A business failure with a plain message.
    #[error("{0}")]
    Message(String),

    /// A business failure carrying structured data.
    #[error("action rejected: {0}")]
    Rejected(Tree),

    /// No action is registered under this path.
    #[error("no action registered at '{0}'")]
    UnknownAction(String),

    /// An asynchronous result needs a tokio runtime to settle.
    #[error("asynchronous action '{0}' invoked outside a tokio runtime")]
    NoRuntime(String),

    /// The task settling the action went away without a result.
    #[error("action task for '{0}' ended without a result")]
    Dropped(String),

    #[error(transparent)]
    Other(Arc<anyhow::Error>),
}

impl ActionError {
    pub fn msg(message: impl Into<String>) -> Self {
        ActionError::Message(message.into())
    }

    /// True for the default cancellation token, which consumers drop
    /// without reporting.
    pub fn is_silent_cancel(&self) -> bool {
        matches!(self, ActionError::Cancelled(CancelToken::Sentinel))
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        ActionError::Other(Arc::new(err))
    }
}

impl From<Tree> for ActionError {
    fn from(value: Tree) -> Self {
        ActionError::Rejected(value)
    }
}
