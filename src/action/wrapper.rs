//! The instrumented callable produced for each registered handler.
//!
//! ```text
//! idle ──call──→ executing ──┬──→ success ──→ idle
//!                            └──→ fail    ──→ idle
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::action::context::{CallbackKind, CallbackQueue, LazyContext};
use crate::action::result::{ActionResult, PendingAction};
use crate::action::spec::{ActionOptions, Effect, Handler};
use crate::action::ActionError;
use crate::cancel::{CancelHandle, Cancellable};
use crate::lens::Lens;
use crate::store::{Intent, WeakStore};
use crate::tree::Tree;

/// Status observed by the view layer.
///
/// `success` and `fail` are `None` until the first call.
#[derive(Debug, Clone, Default)]
pub struct ActionStatus {
    pub executing: bool,
    pub success: Option<bool>,
    pub fail: Option<bool>,
    pub error: Option<ActionError>,
}

/// What evaluating a handler (and any lazy bodies) produced.
enum Outcome {
    Now(Tree),
    Later(Cancellable),
}

/// One registered action.
///
/// Concurrent calls of the same non-single wrapper race on its status;
/// the last one to settle wins.
pub struct ActionWrapper {
    action_path: String,
    state_path: String,
    state_lens: Lens,
    handler: Handler,
    options: ActionOptions,
    store: WeakStore,
    status: Mutex<ActionStatus>,
    last_result: Mutex<Option<CancelHandle>>,
    next_options: Mutex<Option<ActionOptions>>,
    calls: AtomicU64,
}

impl ActionWrapper {
    pub(crate) fn new(
        action_path: String,
        state_path: String,
        handler: Handler,
        options: ActionOptions,
        store: WeakStore,
    ) -> Self {
        let state_lens = Lens::compile(&state_path);
        Self {
            action_path,
            state_path,
            state_lens,
            handler,
            options,
            store,
            status: Mutex::new(ActionStatus::default()),
            last_result: Mutex::new(None),
            next_options: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Dotted path the action is registered under; also the intent kind.
    pub fn action_path(&self) -> &str {
        &self.action_path
    }

    /// Path in the state tree the result is written to.
    pub fn state_path(&self) -> &str {
        &self.state_path
    }

    pub fn options(&self) -> &ActionOptions {
        &self.options
    }

    pub fn status(&self) -> ActionStatus {
        self.status.lock().clone()
    }

    pub fn executing(&self) -> bool {
        self.status.lock().executing
    }

    pub fn success(&self) -> Option<bool> {
        self.status.lock().success
    }

    pub fn fail(&self) -> Option<bool> {
        self.status.lock().fail
    }

    pub fn error(&self) -> Option<ActionError> {
        self.status.lock().error.clone()
    }

    /// Use `options` for the next call only.
    pub fn with(self: &Arc<Self>, options: ActionOptions) -> OneShot {
        OneShot {
            wrapper: Arc::clone(self),
            options,
        }
    }

    /// Invoke the handler.
    ///
    /// Synchronous results are dispatched before this returns. Futures are
    /// settled on the ambient tokio runtime, strictly after this returns.
    /// A synchronous failure is recorded and returned; an asynchronous one
    /// is recorded and surfaces only through the [`PendingAction`].
    pub fn call(self: &Arc<Self>, args: &[Tree]) -> Result<ActionResult, ActionError> {
        let options = self
            .next_options
            .lock()
            .take()
            .unwrap_or_else(|| self.options.clone())
            .normalized();
        let call_id = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.last_result.lock().take();
        if options.single {
            if let Some(previous) = previous {
                if previous.cancel() {
                    tracing::debug!(action = %self.action_path, "Cancelled previous pending call");
                }
            }
        }

        let queue = Arc::new(CallbackQueue::default());
        {
            let mut status = self.status.lock();
            status.error = None;
            status.executing = true;
            status.success = Some(false);
            status.fail = Some(false);
        }

        let outcome = {
            let _idle = scopeguard::guard((), |_| self.status.lock().executing = false);
            self.evaluate(args, &queue)
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                {
                    let mut status = self.status.lock();
                    status.fail = Some(true);
                    status.error = Some(err.clone());
                }
                tracing::warn!(action = %self.action_path, error = %err, "Action failed");
                return Err(err);
            }
        };

        match outcome {
            Outcome::Now(value) => {
                self.status.lock().success = Some(true);
                self.commit(value.clone());
                queue.fire(&[CallbackKind::Done]);
                Ok(ActionResult::Ready(value))
            }
            Outcome::Later(future) => self.settle_later(future, options, queue, call_id),
        }
    }

    fn evaluate(&self, args: &[Tree], queue: &Arc<CallbackQueue>) -> Result<Outcome, ActionError> {
        let mut effect = (self.handler)(args)?;
        loop {
            effect = match effect {
                Effect::Value(value) => return Ok(Outcome::Now(value)),
                Effect::Future(future) => return Ok(Outcome::Later(future)),
                Effect::Lazy(body) => {
                    let cx = LazyContext::new(
                        self.store.clone(),
                        self.state_lens.clone(),
                        Arc::clone(queue),
                    );
                    body(&cx)?
                }
            };
        }
    }

    fn settle_later(
        self: &Arc<Self>,
        future: Cancellable,
        options: ActionOptions,
        queue: Arc<CallbackQueue>,
        call_id: u64,
    ) -> Result<ActionResult, ActionError> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let err = ActionError::NoRuntime(self.action_path.clone());
            let mut status = self.status.lock();
            status.fail = Some(true);
            status.error = Some(err.clone());
            return Err(err);
        };

        self.status.lock().executing = true;
        let handle = future.handle();
        if options.single {
            *self.last_result.lock() = Some(handle.clone());
        }
        if options.dispatch_status {
            self.ping_status();
        }

        let (tx, rx) = watch::channel(None);
        let wrapper = Arc::clone(self);
        runtime.spawn(async move {
            let result = future.await;
            wrapper.settle(&result, &options, &queue, call_id);
            tx.send_replace(Some(result));
        });

        Ok(ActionResult::Pending(PendingAction::new(
            self.action_path.clone(),
            handle,
            rx,
        )))
    }

    fn settle(
        &self,
        result: &Result<Tree, ActionError>,
        options: &ActionOptions,
        queue: &CallbackQueue,
        call_id: u64,
    ) {
        match result {
            Ok(value) => {
                {
                    let mut status = self.status.lock();
                    status.success = Some(true);
                    status.executing = false;
                }
                self.commit(value.clone());
                queue.fire(&[CallbackKind::Success, CallbackKind::Done]);
                // A null result may leave the tree untouched; make sure the
                // executing -> success transition is still observed.
                if value.is_null() && options.dispatch_status {
                    self.ping_status();
                }
            }
            Err(err) if err.is_silent_cancel() => {
                if self.calls.load(Ordering::SeqCst) == call_id {
                    self.status.lock().executing = false;
                }
                tracing::debug!(action = %self.action_path, "Dropped cancelled result");
            }
            Err(err) => {
                {
                    let mut status = self.status.lock();
                    status.executing = false;
                    status.fail = Some(true);
                    status.error = Some(err.clone());
                }
                tracing::warn!(action = %self.action_path, error = %err, "Asynchronous action failed");
                if options.dispatch_status {
                    self.ping_status();
                }
                queue.fire(&[CallbackKind::Fail, CallbackKind::Done]);
            }
        }
    }

    fn commit(&self, payload: Tree) {
        match self.store.upgrade() {
            Some(store) => store.dispatch(Intent::write(
                self.action_path.clone(),
                self.state_path.clone(),
                payload,
            )),
            None => tracing::warn!(action = %self.action_path, "Store dropped; result discarded"),
        }
    }

    fn ping_status(&self) {
        if let Some(store) = self.store.upgrade() {
            store.ping_status();
        }
    }
}

impl std::fmt::Debug for ActionWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionWrapper")
            .field("action_path", &self.action_path)
            .field("state_path", &self.state_path)
            .field("options", &self.options)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// A call that uses one-off options. See [`ActionWrapper::with`].
pub struct OneShot {
    wrapper: Arc<ActionWrapper>,
    options: ActionOptions,
}

impl OneShot {
    pub fn call(self, args: &[Tree]) -> Result<ActionResult, ActionError> {
        *self.wrapper.next_options.lock() = Some(self.options);
        self.wrapper.call(args)
    }
}
