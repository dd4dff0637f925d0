//! Declarative description of the actions to register.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::context::LazyContext;
use crate::action::ActionError;
use crate::cancel::{Cancellable, IntoCancellable};
use crate::lens::{Path, Segment};
use crate::tree::Tree;

/// Per-action behaviour flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionOptions {
    /// Overrides the name the action is registered and dispatched under.
    pub name: Option<String>,
    /// Cancel a still-pending previous call when invoked again.
    pub single: bool,
    /// Send status pings around asynchronous settlement. Implies `single`.
    pub dispatch_status: bool,
}

impl ActionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn single_flight() -> Self {
        Self {
            single: true,
            ..Self::default()
        }
    }

    pub fn with_status() -> Self {
        Self {
            dispatch_status: true,
            ..Self::default()
        }
    }

    /// Options as they apply to a call: `dispatch_status` forces `single`.
    pub(crate) fn normalized(mut self) -> Self {
        if self.dispatch_status {
            self.single = true;
        }
        self
    }
}

/// Body returned by a lazy handler; runs with access to the store.
pub type LazyBody = Box<dyn FnOnce(&LazyContext) -> Result<Effect, ActionError> + Send>;

/// What a handler produced.
pub enum Effect {
    /// Synchronous result, written to the action's state path immediately.
    Value(Tree),
    /// Asynchronous result, written once it resolves.
    Future(Cancellable),
    /// Deferred body that needs the store context to compute its result.
    Lazy(LazyBody),
}

impl Effect {
    pub fn value(value: impl Into<Tree>) -> Self {
        Effect::Value(value.into())
    }

    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Tree, ActionError>> + Send + 'static,
    {
        Effect::Future(Cancellable::new(future))
    }

    pub fn cancellable(source: impl IntoCancellable) -> Self {
        Effect::Future(Cancellable::wrap(source))
    }

    pub fn lazy<F>(body: F) -> Self
    where
        F: FnOnce(&LazyContext) -> Result<Effect, ActionError> + Send + 'static,
    {
        Effect::Lazy(Box::new(body))
    }
}

impl From<Tree> for Effect {
    fn from(value: Tree) -> Self {
        Effect::Value(value)
    }
}

impl From<Cancellable> for Effect {
    fn from(future: Cancellable) -> Self {
        Effect::Future(future)
    }
}

/// A registered function.
pub type Handler = Arc<dyn Fn(&[Tree]) -> Result<Effect, ActionError> + Send + Sync>;

/// One entry of an [`ActionSpec`].
pub enum SpecEntry {
    Action {
        handler: Handler,
        options: ActionOptions,
    },
    Group(ActionSpec),
}

impl SpecEntry {
    pub fn action<F>(handler: F, options: ActionOptions) -> Self
    where
        F: Fn(&[Tree]) -> Result<Effect, ActionError> + Send + Sync + 'static,
    {
        SpecEntry::Action {
            handler: Arc::new(handler),
            options,
        }
    }
}

/// Nested map of keys to actions or groups.
///
/// A key may be `"name:statePath"`: the action is registered (and its
/// intents typed) as `name`, and its result is written to `statePath`.
/// Groups prefix every path inside them with their key.
#[derive(Default)]
pub struct ActionSpec {
    entries: Vec<(String, SpecEntry)>,
}

impl ActionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action<F>(self, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Tree]) -> Result<Effect, ActionError> + Send + Sync + 'static,
    {
        self.action_with(key, handler, ActionOptions::default())
    }

    pub fn action_with<F>(mut self, key: impl Into<String>, handler: F, options: ActionOptions) -> Self
    where
        F: Fn(&[Tree]) -> Result<Effect, ActionError> + Send + Sync + 'static,
    {
        self.entries
            .push((key.into(), SpecEntry::action(handler, options)));
        self
    }

    pub fn group(mut self, key: impl Into<String>, spec: ActionSpec) -> Self {
        self.entries.push((key.into(), SpecEntry::Group(spec)));
        self
    }

    pub fn entry(mut self, key: impl Into<String>, entry: SpecEntry) -> Self {
        self.entries.push((key.into(), entry));
        self
    }

    /// A spec holding `entry` under the dotted `path`, one group per
    /// leading segment.
    pub fn at_path(path: &str, entry: SpecEntry) -> ActionSpec {
        let parsed = Path::parse(path);
        let Some((parent, last)) = parsed.split_last() else {
            return ActionSpec::new().entry(path, entry);
        };
        let leaf = ActionSpec::new().entry(last.to_string(), entry);
        parent
            .segments()
            .iter()
            .rev()
            .fold(leaf, |inner, segment: &Segment| {
                ActionSpec::new().group(segment.to_string(), inner)
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, SpecEntry)> {
        self.entries
    }
}

/// Names derived from a spec key: `(explicit action name, state key)`.
pub(crate) fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(':') {
        Some((name, state)) => (Some(name), state),
        None => (None, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_status_implies_single() {
        let options = ActionOptions::with_status().normalized();
        assert!(options.single);
        assert!(!ActionOptions::default().normalized().single);
    }

    #[test]
    fn split_key_reads_explicit_name() {
        assert_eq!(split_key("load:items"), (Some("load"), "items"));
        assert_eq!(split_key("items"), (None, "items"));
    }

    #[test]
    fn at_path_nests_groups() {
        let spec = ActionSpec::at_path(
            "todos.remote.load",
            SpecEntry::action(|_| Ok(Effect::value(1)), ActionOptions::default()),
        );
        let entries = spec.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "todos");
        let SpecEntry::Group(inner) = &entries[0].1 else {
            panic!("expected group");
        };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn options_deserialize_from_toml_like_maps() {
        let options: ActionOptions = serde_json::from_str(r#"{"single": true}"#).unwrap();
        assert!(options.single);
        assert_eq!(options.name, None);
    }
}
