//! Cooperative cancellation for in-flight action results.
//!
//! Cancelling never stops the underlying work. It records a token, asks the
//! source to stop if it has an abort hook, and turns whatever the source
//! eventually produces into `Err(ActionError::Cancelled(token))`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_core::future::BoxFuture;
use parking_lot::Mutex;

use crate::action::ActionError;
use crate::tree::Tree;

/// Callback asked to stop the wrapped work on cancellation.
pub type AbortHook = Box<dyn FnOnce() + Send>;

/// Future shape accepted by [`Cancellable`].
pub type ActionFuture = BoxFuture<'static, Result<Tree, ActionError>>;

/// Reason recorded by the first `cancel` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CancelToken {
    /// Default token. Rejections carrying it are dropped silently.
    #[default]
    Sentinel,
    /// Caller-supplied token. Surfaces as an ordinary failure.
    Custom(Tree),
}

impl fmt::Display for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelToken::Sentinel => f.write_str("cancelled"),
            CancelToken::Custom(token) => write!(f, "{token}"),
        }
    }
}

#[derive(Default)]
struct CancelState {
    token: Mutex<Option<CancelToken>>,
    abort: Mutex<Option<AbortHook>>,
}

/// Shareable cancellation side of a [`Cancellable`].
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Cancel with the default token. See [`CancelHandle::cancel_with`].
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelToken::Sentinel)
    }

    /// Record `token` and run the abort hook.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub fn cancel_with(&self, token: CancelToken) -> bool {
        {
            let mut slot = self.state.token.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(token);
        }
        if let Some(abort) = self.state.abort.lock().take() {
            abort();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.token.lock().is_some()
    }

    pub fn token(&self) -> Option<CancelToken> {
        self.state.token.lock().clone()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("token", &self.token())
            .finish()
    }
}

/// An asynchronous action result that can be cancelled.
pub struct Cancellable {
    source: ActionFuture,
    state: Arc<CancelState>,
}

impl Cancellable {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Tree, ActionError>> + Send + 'static,
    {
        Self {
            source: Box::pin(future),
            state: Arc::new(CancelState::default()),
        }
    }

    /// Wrap `future` with a hook that is invoked once on cancellation.
    pub fn with_abort<F, A>(future: F, abort: A) -> Self
    where
        F: Future<Output = Result<Tree, ActionError>> + Send + 'static,
        A: FnOnce() + Send + 'static,
    {
        let cancellable = Self::new(future);
        *cancellable.state.abort.lock() = Some(Box::new(abort));
        cancellable
    }

    /// Run `future` as a tokio task; cancelling aborts the task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<Tree, ActionError>> + Send + 'static,
    {
        let task = tokio::spawn(future);
        let abort = task.abort_handle();
        Self::with_abort(
            async move {
                match task.await {
                    Ok(result) => result,
                    Err(err) => Err(ActionError::from(anyhow::Error::new(err))),
                }
            },
            move || abort.abort(),
        )
    }

    /// Wrap anything convertible. Wrapping a `Cancellable` returns it as is.
    pub fn wrap(source: impl IntoCancellable) -> Self {
        source.into_cancellable()
    }

    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn cancel(&self) -> bool {
        self.handle().cancel()
    }
}

impl Future for Cancellable {
    type Output = Result<Tree, ActionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(self.source.as_mut().poll(cx));
        // A recorded token supersedes both success and failure.
        match self.state.token.lock().clone() {
            Some(token) => Poll::Ready(Err(ActionError::Cancelled(token))),
            None => Poll::Ready(result),
        }
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

/// Conversion into a [`Cancellable`].
pub trait IntoCancellable {
    fn into_cancellable(self) -> Cancellable;
}

impl IntoCancellable for Cancellable {
    fn into_cancellable(self) -> Cancellable {
        self
    }
}

impl IntoCancellable for ActionFuture {
    fn into_cancellable(self) -> Cancellable {
        Cancellable {
            source: self,
            state: Arc::new(CancelState::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn resolves_normally_without_cancel() {
        let c = Cancellable::new(async { Ok(Tree::from(1)) });
        assert_eq!(c.await.unwrap(), Tree::from(1));
    }

    #[tokio::test]
    async fn success_after_cancel_becomes_sentinel_rejection() {
        let (tx, rx) = oneshot::channel::<i64>();
        let c = Cancellable::new(async move { Ok(Tree::from(rx.await.unwrap_or(0))) });
        assert!(c.cancel());
        tx.send(7).unwrap();
        let err = c.await.unwrap_err();
        assert!(err.is_silent_cancel());
    }

    #[tokio::test]
    async fn failure_after_cancel_is_superseded_by_token() {
        let c = Cancellable::new(async { Err(ActionError::msg("boom")) });
        c.handle().cancel_with(CancelToken::Custom(Tree::from("stop")));
        match c.await {
            Err(ActionError::Cancelled(CancelToken::Custom(t))) => assert_eq!(t, Tree::from("stop")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_first_cancel_counts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let c = Cancellable::with_abort(async { Ok(Tree::Null) }, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let handle = c.handle();
        assert!(handle.cancel());
        assert!(!handle.cancel_with(CancelToken::Custom(Tree::from(1))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(handle.token(), Some(CancelToken::Sentinel));
    }

    #[tokio::test]
    async fn wrapping_is_idempotent() {
        let c = Cancellable::new(async { Ok(Tree::Null) });
        let handle = c.handle();
        let wrapped = Cancellable::wrap(c);
        handle.cancel();
        assert!(wrapped.handle().is_cancelled());
    }

    #[tokio::test]
    async fn spawned_task_is_aborted_on_cancel() {
        let c = Cancellable::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(Tree::from("late"))
        });
        c.cancel();
        let err = c.await.unwrap_err();
        assert!(err.is_silent_cancel());
    }
}
