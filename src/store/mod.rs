//! The store facade.
//!
//! Owns the single state tree, runs every dispatched [`Intent`] through
//! the root reducer, notifies subscribers, and hosts the action registry
//! and optional autosave.
//!
//! ```text
//! ActionWrapper ──→ dispatch(Intent) ──→ reduce ──→ Tree ──→ subscribers
//!       ↑                                                       │
//!       └───────────────────────────────────────────────────────┘
//! ```

mod autosave;
mod intent;
mod reducer;
mod storage;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::action::{
    register, ActionError, ActionOptions, ActionResult, ActionSpec, ActionTree, ActionWrapper,
    Effect, SpecEntry,
};
use crate::config::StoreConfig;
use crate::tree::Tree;

pub use autosave::{
    save_state, AutoSaveOptions, Debouncer, DEFAULT_AUTOSAVE_KEY, DEFAULT_DEBOUNCE_MS,
};
pub use intent::{Intent, Patch};
pub use reducer::{reduce, CombinedReducer, Reducer};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};

use autosave::AutoSaver;

/// Errors raised by the store outside of action execution.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to parse persisted state under '{key}': {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Autosave is not enabled")]
    AutoSaveDisabled,
}

type Listener = Arc<dyn Fn(&Tree) + Send + Sync>;

pub(crate) struct StoreInner {
    id: Uuid,
    state: RwLock<Tree>,
    version: AtomicU64,
    reducer: RwLock<Option<Arc<dyn Reducer>>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    actions: RwLock<ActionTree>,
    actions_version: AtomicU64,
    storage: Arc<dyn Storage>,
    autosave: Mutex<Option<(AutoSaver, Subscription)>>,
    autosave_error: Arc<Mutex<Option<String>>>,
}

/// Shared handle to one state container. Cloning is cheap.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Non-owning store handle held by action wrappers.
#[derive(Clone, Default)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

enum Initial {
    Value(Tree),
    Restore { key: String, default: Tree },
}

/// Configures and creates a [`Store`].
pub struct StoreBuilder {
    initial: Initial,
    storage: Option<Arc<dyn Storage>>,
    reducer: Option<Arc<dyn Reducer>>,
    autosave: Option<AutoSaveOptions>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            initial: Initial::Value(Tree::map()),
            storage: None,
            reducer: None,
            autosave: None,
        }
    }
}

impl StoreBuilder {
    /// Start from a literal state.
    pub fn initial(mut self, state: impl Into<Tree>) -> Self {
        self.initial = Initial::Value(state.into());
        self
    }

    /// Start from the blob persisted under `key`, or `default` when there is
    /// none. Autosave is enabled on the same key.
    pub fn restore(mut self, key: impl Into<String>, default: impl Into<Tree>) -> Self {
        self.initial = Initial::Restore {
            key: key.into(),
            default: default.into(),
        };
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn reducer(mut self, reducer: impl Reducer + 'static) -> Self {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn autosave(mut self, options: AutoSaveOptions) -> Self {
        self.autosave = Some(options);
        self
    }

    /// Apply storage and autosave settings from a loaded config.
    pub fn config(mut self, config: &StoreConfig) -> Self {
        self.storage = Some(Arc::new(FileStorage::new(config.storage_dir())));
        if config.autosave.enabled {
            self.autosave = Some(config.autosave.options());
        }
        self
    }

    pub fn build(self) -> Result<Store, StoreError> {
        let storage: Arc<dyn Storage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };

        let (state, autosave) = match self.initial {
            Initial::Value(state) => (state, self.autosave),
            Initial::Restore { key, default } => {
                let state = match storage.get(&key)? {
                    Some(text) => {
                        let restored: Tree = serde_json::from_str(&text)
                            .map_err(|source| StoreError::Parse {
                                key: key.clone(),
                                source,
                            })?;
                        if restored.is_truthy() {
                            restored
                        } else {
                            default
                        }
                    }
                    None => default,
                };
                let options = AutoSaveOptions {
                    key,
                    ..self.autosave.unwrap_or_default()
                };
                (state, Some(options))
            }
        };

        let store = Store::from_parts(state, storage, self.reducer);

        if let Some(options) = autosave {
            store.auto_save(options);
        }

        tracing::debug!(store = %store.id(), "Store created");
        Ok(store)
    }
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// A store over `initial` with in-memory storage and no autosave.
    pub fn new(initial: impl Into<Tree>) -> Store {
        Store::from_parts(initial.into(), Arc::new(MemoryStorage::new()), None)
    }

    fn from_parts(
        state: Tree,
        storage: Arc<dyn Storage>,
        reducer: Option<Arc<dyn Reducer>>,
    ) -> Store {
        Store {
            inner: Arc::new(StoreInner {
                id: Uuid::new_v4(),
                state: RwLock::new(state),
                version: AtomicU64::new(0),
                reducer: RwLock::new(reducer),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                actions: RwLock::new(ActionTree::default()),
                actions_version: AtomicU64::new(0),
                storage,
                autosave: Mutex::new(None),
                autosave_error: Arc::new(Mutex::new(None)),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Snapshot of the current state. Cheap: containers are shared.
    pub fn get_state(&self) -> Tree {
        self.inner.state.read().clone()
    }

    /// Incremented whenever the state changes or a status ping is sent.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Run `intent` through the reducer and notify every subscriber.
    pub fn dispatch(&self, intent: Intent) {
        let custom = self.inner.reducer.read().clone();
        let (changed, state) = {
            let mut state = self.inner.state.write();
            let next = reduce(&state, &intent, custom.as_deref());
            let changed = !Tree::same(&state, &next);
            if changed {
                *state = next;
            }
            (changed, state.clone())
        };

        if changed || intent.is_status() {
            self.inner.version.fetch_add(1, Ordering::SeqCst);
        }
        tracing::trace!(
            store = %self.inner.id,
            kind = %intent.kind,
            changed,
            "Dispatched intent"
        );

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&state);
        }
    }

    /// Register `listener`; it runs after every dispatch with the new state.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Tree) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// The built-in `$` action: shallow-merge `changes` into the root.
    pub fn merge(&self, changes: impl Into<Tree>) {
        self.dispatch(Intent::merge(changes.into()));
    }

    /// Tell observers that something outside the tree (action status,
    /// prefetch results) changed.
    pub fn ping_status(&self) {
        self.dispatch(Intent::status());
    }

    /// Install or replace the reducer for intents without a patch.
    pub fn set_reducer(&self, reducer: impl Reducer + 'static) {
        *self.inner.reducer.write() = Some(Arc::new(reducer));
    }

    /// Register every action in `spec`.
    pub fn actions(&self, spec: ActionSpec) -> &Self {
        let store = self.downgrade();
        let mut tree = self.inner.actions.write();
        register(&mut tree, &store, None, spec);
        self.inner.actions_version.fetch_add(1, Ordering::SeqCst);
        self
    }

    /// Register a single action under a dotted `key`, e.g. `"todos.load"`.
    pub fn action<F>(&self, key: &str, handler: F, options: ActionOptions) -> &Self
    where
        F: Fn(&[Tree]) -> Result<Effect, ActionError> + Send + Sync + 'static,
    {
        let entry = SpecEntry::action(handler, options);
        self.actions(ActionSpec::at_path(key, entry))
    }

    /// Register an action that writes its first argument to `key`.
    pub fn setter(&self, key: &str, options: ActionOptions) -> &Self {
        self.action(
            key,
            |args: &[Tree]| Ok(Effect::Value(args.first().cloned().unwrap_or_default())),
            options,
        )
    }

    /// Incremented on every registration; snapshots from
    /// [`Store::action_tree`] taken at different values may differ.
    pub fn actions_version(&self) -> u64 {
        self.inner.actions_version.load(Ordering::SeqCst)
    }

    /// Snapshot of the registered action tree.
    pub fn action_tree(&self) -> ActionTree {
        self.inner.actions.read().clone()
    }

    pub fn find_action(&self, path: &str) -> Option<Arc<ActionWrapper>> {
        self.inner.actions.read().find(path)
    }

    /// Look up the wrapper at `path` and call it with `args`.
    pub fn invoke(&self, path: &str, args: &[Tree]) -> Result<ActionResult, ActionError> {
        let wrapper = self
            .find_action(path)
            .ok_or_else(|| ActionError::UnknownAction(path.to_string()))?;
        wrapper.call(args)
    }

    /// Enable autosave, replacing any previous configuration.
    pub fn auto_save(&self, options: AutoSaveOptions) -> &Self {
        let saver = AutoSaver::start(
            options.clone(),
            Arc::clone(&self.inner.storage),
            Arc::clone(&self.inner.autosave_error),
        );
        let debouncer = saver.debouncer();
        let subscription = self.subscribe(move |state| debouncer.call(state.clone()));
        let previous = self.inner.autosave.lock().replace((saver, subscription));
        // Drop outside the lock: it joins the old writer thread.
        drop(previous);
        tracing::info!(
            store = %self.inner.id,
            key = %options.key,
            debounce_ms = options.debounce_ms,
            "Autosave enabled"
        );
        self
    }

    pub fn disable_auto_save(&self) {
        let previous = self.inner.autosave.lock().take();
        drop(previous);
    }

    /// Persist the current state right away under the autosave key.
    pub fn save_now(&self) -> Result<(), StoreError> {
        let key = self
            .inner
            .autosave
            .lock()
            .as_ref()
            .map(|(saver, _)| saver.options().key.clone())
            .ok_or(StoreError::AutoSaveDisabled)?;
        save_state(self.inner.storage.as_ref(), &key, &self.get_state())
    }

    /// Message of the most recent failed background save, if the last
    /// attempt failed.
    pub fn last_autosave_error(&self) -> Option<String> {
        self.inner.autosave_error.lock().clone()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.inner.storage)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
