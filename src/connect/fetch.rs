//! Prefetch results in a uniform shape.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action::{ActionError, ActionResult};
use crate::cancel::ActionFuture;
use crate::store::WeakStore;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Loading,
    Success,
    Fail,
}

/// What a prefetch produced so far.
///
/// On failure `payload` carries the rejection: the rejected tree itself,
/// or the error message.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub payload: Tree,
}

impl FetchResult {
    pub fn loading() -> Self {
        Self {
            status: FetchStatus::Loading,
            payload: Tree::Null,
        }
    }

    pub fn success(payload: Tree) -> Self {
        Self {
            status: FetchStatus::Success,
            payload,
        }
    }

    pub fn fail(payload: Tree) -> Self {
        Self {
            status: FetchStatus::Fail,
            payload,
        }
    }

    pub fn from_error(err: &ActionError) -> Self {
        match err {
            ActionError::Rejected(reason) => Self::fail(reason.clone()),
            other => Self::fail(Tree::from(other.to_string())),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn is_fail(&self) -> bool {
        self.status == FetchStatus::Fail
    }
}

/// What a prefetch function returns.
pub enum Fetch {
    Value(Tree),
    Future(ActionFuture),
}

impl Fetch {
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Tree, ActionError>> + Send + 'static,
    {
        Fetch::Future(Box::pin(future))
    }
}

impl From<Tree> for Fetch {
    fn from(value: Tree) -> Self {
        Fetch::Value(value)
    }
}

/// Prefetching through an action: a pending call is awaited.
impl From<ActionResult> for Fetch {
    fn from(result: ActionResult) -> Self {
        match result {
            ActionResult::Ready(value) => Fetch::Value(value),
            ActionResult::Pending(pending) => Fetch::Future(pending.into_future()),
        }
    }
}

/// The prefetch for one argument value.
#[derive(Clone)]
pub(crate) struct FetchSlot {
    args: Tree,
    result: Arc<Mutex<FetchResult>>,
}

impl FetchSlot {
    /// A slot for `args` that is loading until resolved.
    pub(crate) fn new(args: Tree) -> Self {
        Self {
            args,
            result: Arc::new(Mutex::new(FetchResult::loading())),
        }
    }

    /// Record `fetched`. A future keeps the slot loading; when it settles
    /// the slot is updated and the store gets a status ping so connectors
    /// recompute.
    pub(crate) fn resolve(&self, fetched: Result<Fetch, ActionError>, store: WeakStore) {
        let future = match fetched {
            Ok(Fetch::Value(value)) => {
                *self.result.lock() = FetchResult::success(value);
                return;
            }
            Err(err) => {
                *self.result.lock() = FetchResult::from_error(&err);
                return;
            }
            Ok(Fetch::Future(future)) => future,
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let err = ActionError::NoRuntime("prefetch".to_string());
            *self.result.lock() = FetchResult::from_error(&err);
            return;
        };

        let slot = Arc::clone(&self.result);
        runtime.spawn(async move {
            let settled = match future.await {
                Ok(value) => FetchResult::success(value),
                Err(err) if err.is_silent_cancel() => {
                    tracing::debug!("Prefetch cancelled");
                    return;
                }
                Err(err) => FetchResult::from_error(&err),
            };
            *slot.lock() = settled;
            if let Some(store) = store.upgrade() {
                store.ping_status();
            }
        });
    }

    pub(crate) fn args(&self) -> &Tree {
        &self.args
    }

    pub(crate) fn snapshot(&self) -> FetchResult {
        self.result.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(fetched: Result<Fetch, ActionError>) -> FetchSlot {
        let slot = FetchSlot::new(Tree::Null);
        slot.resolve(fetched, WeakStore::default());
        slot
    }

    #[test]
    fn sync_values_are_immediately_successful() {
        let slot = resolved(Ok(Fetch::from(Tree::from(3))));
        assert_eq!(slot.snapshot(), FetchResult::success(Tree::from(3)));
    }

    #[test]
    fn rejected_tree_becomes_the_payload() {
        let slot = resolved(Err(ActionError::Rejected(Tree::from("offline"))));
        assert!(slot.snapshot().is_fail());
        assert_eq!(slot.snapshot().payload, Tree::from("offline"));
    }

    #[test]
    fn futures_without_runtime_fail() {
        let slot = resolved(Ok(Fetch::future(async { Ok(Tree::Null) })));
        assert!(slot.snapshot().is_fail());
    }

    #[tokio::test]
    async fn futures_settle_in_the_background() {
        let (tx, rx) = tokio::sync::oneshot::channel::<i64>();
        let slot = resolved(Ok(Fetch::future(async move {
            Ok(Tree::from(rx.await.unwrap_or(0)))
        })));
        assert!(slot.snapshot().is_loading());
        tx.send(9).unwrap();
        for _ in 0..50 {
            if !slot.snapshot().is_loading() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(slot.snapshot(), FetchResult::success(Tree::from(9)));
    }
}
