//! Reducers: the only place state transitions happen.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::lens::Lens;
use crate::store::intent::{Intent, Patch};
use crate::tree::{deep_equals, Tree, TreeMap};

/// Reducer transforms state based on intents.
///
/// It must be a pure function: `(state, intent) -> state`. Returning a
/// tree that is [`Tree::same`] as the input means "nothing changed".
pub trait Reducer: Send + Sync {
    fn reduce(&self, state: &Tree, intent: &Intent) -> Tree;
}

impl<F> Reducer for F
where
    F: Fn(&Tree, &Intent) -> Tree + Send + Sync,
{
    fn reduce(&self, state: &Tree, intent: &Intent) -> Tree {
        self(state, intent)
    }
}

/// Root reducer: applies patch intents and delegates the rest.
pub fn reduce(state: &Tree, intent: &Intent, custom: Option<&dyn Reducer>) -> Tree {
    match &intent.patch {
        None => match custom {
            Some(reducer) => reducer.reduce(state, intent),
            None => state.clone(),
        },
        Some(Patch::Status) => state.clone(),
        Some(Patch::Merge) => merge(state, &intent.payload),
        Some(Patch::Path(path)) => {
            let lens = Lens::compile(path);
            if lens
                .get(state)
                .is_some_and(|current| deep_equals(current, &intent.payload))
            {
                return state.clone();
            }
            lens.set(state, intent.payload.clone())
        }
    }
}

/// Shallow-merge `changes` into the root map.
///
/// The root is returned untouched when every key of `changes` already
/// holds an equal value.
fn merge(state: &Tree, changes: &Tree) -> Tree {
    let Some(changes) = changes.as_map() else {
        tracing::warn!("Ignoring merge intent with a non-map payload");
        return state.clone();
    };

    let current = state.as_map();
    let unchanged = changes.iter().all(|(key, value)| {
        current
            .and_then(|m| m.get(key))
            .is_some_and(|existing| deep_equals(existing, value))
    });
    if unchanged {
        return state.clone();
    }

    let mut merged = current.cloned().unwrap_or_default();
    for (key, value) in changes.iter() {
        merged.insert(key.clone(), value.clone());
    }
    Tree::from_map(merged)
}

/// Routes each top-level key of the state to its own reducer.
///
/// Keys without a registered reducer are carried over unchanged.
#[derive(Default, Clone)]
pub struct CombinedReducer {
    reducers: IndexMap<String, Arc<dyn Reducer>>,
}

impl CombinedReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.reducers.insert(key.into(), Arc::new(reducer));
        self
    }
}

impl Reducer for CombinedReducer {
    fn reduce(&self, state: &Tree, intent: &Intent) -> Tree {
        let mut next: Option<TreeMap> = None;
        for (key, reducer) in &self.reducers {
            let current = state.get(key).cloned().unwrap_or_default();
            let updated = reducer.reduce(&current, intent);
            if !Tree::same(&current, &updated) {
                next.get_or_insert_with(|| state.as_map().cloned().unwrap_or_default())
                    .insert(key.clone(), updated);
            }
        }
        match next {
            Some(map) => Tree::from_map(map),
            None => state.clone(),
        }
    }
}
