//! What calling an action hands back.

use std::future::IntoFuture;

use futures_core::future::BoxFuture;
use tokio::sync::watch;

use crate::action::ActionError;
use crate::cancel::{CancelHandle, CancelToken};
use crate::tree::Tree;

pub(crate) type Settlement = Option<Result<Tree, ActionError>>;

/// Result of calling an action wrapper.
#[derive(Debug)]
pub enum ActionResult {
    /// The handler produced its value synchronously; it is already in the
    /// store.
    Ready(Tree),
    /// The handler returned a future; the store is updated once it settles.
    Pending(PendingAction),
}

impl ActionResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActionResult::Pending(_))
    }

    pub fn ready(&self) -> Option<&Tree> {
        match self {
            ActionResult::Ready(value) => Some(value),
            ActionResult::Pending(_) => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingAction> {
        match self {
            ActionResult::Pending(pending) => Some(pending),
            ActionResult::Ready(_) => None,
        }
    }
}

impl IntoFuture for ActionResult {
    type Output = Result<Tree, ActionError>;
    type IntoFuture = BoxFuture<'static, Result<Tree, ActionError>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            ActionResult::Ready(value) => Box::pin(async move { Ok(value) }),
            ActionResult::Pending(pending) => pending.into_future(),
        }
    }
}

/// An in-flight asynchronous call.
///
/// Awaiting it yields the settled result after the wrapper has already
/// applied it to the store.
#[derive(Debug)]
pub struct PendingAction {
    action_path: String,
    handle: CancelHandle,
    rx: watch::Receiver<Settlement>,
}

impl PendingAction {
    pub(crate) fn new(action_path: String, handle: CancelHandle, rx: watch::Receiver<Settlement>) -> Self {
        Self {
            action_path,
            handle,
            rx,
        }
    }

    pub fn action_path(&self) -> &str {
        &self.action_path
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    pub fn cancel_with(&self, token: CancelToken) -> bool {
        self.handle.cancel_with(token)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub async fn wait(mut self) -> Result<Tree, ActionError> {
        let settled = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| Err(ActionError::Dropped(self.action_path.clone())))
    }
}

impl IntoFuture for PendingAction {
    type Output = Result<Tree, ActionError>;
    type IntoFuture = BoxFuture<'static, Result<Tree, ActionError>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
