//! Boundary to a rendering layer.
//!
//! A [`Connector`] turns store state, the action registry and the
//! component's own props into memoized [`Props`], optionally attaching the
//! result of a prefetch. Rendering itself stays outside this crate.

mod fetch;
mod selector;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::{ActionError, ActionTree};
use crate::store::{Store, Subscription};
use crate::tree::{deep_equals, Tree};

pub use fetch::{Fetch, FetchResult, FetchStatus};
pub use selector::Selector;

use fetch::FetchSlot;

/// Maps `(state, actions, own props)` to component props. Returning
/// `Tree::Null` passes the own props through.
pub type Mapper = Arc<dyn Fn(&Tree, &ActionTree, &Tree) -> Tree + Send + Sync>;

type Prefetch = Arc<dyn Fn(&Tree) -> Result<Fetch, ActionError> + Send + Sync>;
type ArgsSelector = Selector<Box<dyn Fn(&Tree) -> Tree + Send + Sync>>;

/// What a connected component receives.
#[derive(Debug, Clone)]
pub struct Props {
    pub props: Tree,
    /// Present when the connector has a prefetch.
    pub fetch: Option<FetchResult>,
    pub actions: ActionTree,
}

struct Cached {
    version: u64,
    actions_version: u64,
    own: Tree,
    props: Arc<Props>,
}

pub struct Connector {
    store: Store,
    mapper: Mapper,
    prefetch: Option<Prefetch>,
    args: Option<ArgsSelector>,
    slot: Mutex<Option<FetchSlot>>,
    cached: Mutex<Option<Cached>>,
}

impl Connector {
    pub fn new<M>(store: Store, mapper: M) -> Self
    where
        M: Fn(&Tree, &ActionTree, &Tree) -> Tree + Send + Sync + 'static,
    {
        Self {
            store,
            mapper: Arc::new(mapper),
            prefetch: None,
            args: None,
            slot: Mutex::new(None),
            cached: Mutex::new(None),
        }
    }

    /// Prefetch once, with `Tree::Null` as its input.
    pub fn prefetch<P>(mut self, prefetch: P) -> Self
    where
        P: Fn(&Tree) -> Result<Fetch, ActionError> + Send + Sync + 'static,
    {
        self.prefetch = Some(Arc::new(prefetch));
        self.args = None;
        self
    }

    /// Prefetch with an input derived from the mapped props; the prefetch
    /// runs again whenever that input changes.
    pub fn prefetch_with<S, P>(mut self, args: S, prefetch: P) -> Self
    where
        S: Fn(&Tree) -> Tree + Send + Sync + 'static,
        P: Fn(&Tree) -> Result<Fetch, ActionError> + Send + Sync + 'static,
    {
        self.prefetch = Some(Arc::new(prefetch));
        self.args = Some(Selector::new(Box::new(args)));
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current props for `own`.
    ///
    /// Returns the previous `Arc` when neither the store nor `own` changed,
    /// or when the recomputed props equal the previous ones. Registering an
    /// action always yields fresh props.
    pub fn props(&self, own: &Tree) -> Arc<Props> {
        let version = self.store.version();
        let actions_version = self.store.actions_version();
        if let Some(cached) = self.cached.lock().as_ref() {
            if cached.version == version
                && cached.actions_version == actions_version
                && deep_equals(&cached.own, own)
            {
                return Arc::clone(&cached.props);
            }
        }

        let state = self.store.get_state();
        let actions = self.store.action_tree();
        let mut mapped = (self.mapper)(&state, &actions, own);
        if mapped.is_null() {
            mapped = own.clone();
        }
        let fetch = self
            .prefetch
            .as_ref()
            .map(|prefetch| self.fetch(prefetch, &mapped));

        let mut cached = self.cached.lock();
        if let Some(previous) = cached.as_mut() {
            if previous.actions_version == actions_version
                && deep_equals(&previous.props.props, &mapped)
                && previous.props.fetch == fetch
            {
                previous.version = version;
                previous.own = own.clone();
                return Arc::clone(&previous.props);
            }
        }
        let props = Arc::new(Props {
            props: mapped,
            fetch,
            actions,
        });
        *cached = Some(Cached {
            version,
            actions_version,
            own: own.clone(),
            props: Arc::clone(&props),
        });
        props
    }

    fn fetch(&self, prefetch: &Prefetch, mapped: &Tree) -> FetchResult {
        let args = match &self.args {
            Some(selector) => selector.select(mapped),
            None => Tree::Null,
        };

        // Publish the slot before running the prefetch: it may dispatch,
        // and listeners re-entering `props` must see it as loading.
        let slot = {
            let mut current = self.slot.lock();
            if let Some(slot) = current.as_ref() {
                if deep_equals(slot.args(), &args) {
                    return slot.snapshot();
                }
            }
            let slot = FetchSlot::new(args.clone());
            *current = Some(slot.clone());
            slot
        };

        tracing::debug!(args = %args, "Starting prefetch");
        slot.resolve(prefetch(&args), self.store.downgrade());
        slot.snapshot()
    }

    /// Call `on_change` with the props now and after every store change
    /// that yields different props. Dropping the subscription stops it.
    pub fn watch<F>(self, own: Tree, on_change: F) -> Subscription
    where
        F: Fn(Arc<Props>) + Send + Sync + 'static,
    {
        let connector = Arc::new(self);
        let initial = connector.props(&own);
        let last = Mutex::new(Arc::clone(&initial));
        on_change(initial);

        let store = connector.store.clone();
        store.subscribe(move |_| {
            let props = connector.props(&own);
            let changed = {
                let mut last = last.lock();
                if Arc::ptr_eq(&last, &props) {
                    false
                } else {
                    *last = Arc::clone(&props);
                    true
                }
            };
            if changed {
                on_change(props);
            }
        })
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("store", &self.store)
            .field("prefetch", &self.prefetch.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Connect `mapper` to this store.
    pub fn connect<M>(&self, mapper: M) -> Connector
    where
        M: Fn(&Tree, &ActionTree, &Tree) -> Tree + Send + Sync + 'static,
    {
        Connector::new(self.clone(), mapper)
    }
}

/// Hands one store to every connector of a component subtree.
#[derive(Debug, Clone)]
pub struct Provider {
    store: Store,
}

impl Provider {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn connect<M>(&self, mapper: M) -> Connector
    where
        M: Fn(&Tree, &ActionTree, &Tree) -> Tree + Send + Sync + 'static,
    {
        self.store.connect(mapper)
    }
}
