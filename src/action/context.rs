//! Context handed to lazy action bodies.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::{ActionError, ActionResult, ActionTree};
use crate::lens::Lens;
use crate::store::WeakStore;
use crate::tree::Tree;

/// When a queued callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// After any settlement, sync or async.
    Done,
    /// After an asynchronous success.
    Success,
    /// After an asynchronous failure.
    Fail,
}

type Callback = Box<dyn FnOnce() + Send>;

/// Callbacks queued by one invocation, fired after its dispatch.
#[derive(Default)]
pub(crate) struct CallbackQueue {
    entries: Mutex<Vec<(CallbackKind, Callback)>>,
}

impl CallbackQueue {
    pub(crate) fn push(&self, kind: CallbackKind, callback: Callback) {
        self.entries.lock().push((kind, callback));
    }

    /// Run, in registration order, every callback whose kind is in `kinds`.
    pub(crate) fn fire(&self, kinds: &[CallbackKind]) {
        let ready: Vec<Callback> = {
            let mut entries = self.entries.lock();
            let (matching, rest): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|(kind, _)| kinds.contains(kind));
            *entries = rest;
            matching.into_iter().map(|(_, callback)| callback).collect()
        };
        for callback in ready {
            callback();
        }
    }
}

/// What a lazy body can see and do.
pub struct LazyContext {
    store: WeakStore,
    state_lens: Lens,
    queue: Arc<CallbackQueue>,
}

impl LazyContext {
    pub(crate) fn new(store: WeakStore, state_lens: Lens, queue: Arc<CallbackQueue>) -> Self {
        Self {
            store,
            state_lens,
            queue,
        }
    }

    /// The sibling action wrappers.
    pub fn actions(&self) -> ActionTree {
        self.store
            .upgrade()
            .map(|store| store.action_tree())
            .unwrap_or_default()
    }

    /// The whole current state.
    pub fn state(&self) -> Tree {
        self.store
            .upgrade()
            .map(|store| store.get_state())
            .unwrap_or_default()
    }

    /// The value at this action's state path, or `default` if absent.
    pub fn current(&self, default: impl Into<Tree>) -> Tree {
        let state = self.state();
        match self.state_lens.get(&state) {
            Some(current) => current.clone(),
            None => default.into(),
        }
    }

    /// Call another registered action.
    pub fn invoke(&self, path: &str, args: &[Tree]) -> Result<ActionResult, ActionError> {
        match self.store.upgrade() {
            Some(store) => store.invoke(path, args),
            None => Err(ActionError::UnknownAction(path.to_string())),
        }
    }

    pub fn on_done(&self, callback: impl FnOnce() + Send + 'static) {
        self.queue.push(CallbackKind::Done, Box::new(callback));
    }

    pub fn on_success(&self, callback: impl FnOnce() + Send + 'static) {
        self.queue.push(CallbackKind::Success, Box::new(callback));
    }

    pub fn on_fail(&self, callback: impl FnOnce() + Send + 'static) {
        self.queue.push(CallbackKind::Fail, Box::new(callback));
    }
}
