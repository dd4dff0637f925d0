//! Registry of action wrappers, laid out like the `ActionSpec` they came from.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::action::spec::{split_key, ActionSpec, SpecEntry};
use crate::action::ActionWrapper;
use crate::lens::{Path, Segment};
use crate::store::WeakStore;

/// A registered action or a group of them.
#[derive(Clone)]
pub enum ActionNode {
    Action(Arc<ActionWrapper>),
    Group(ActionTree),
}

/// Tree of action wrappers addressed by dotted path.
#[derive(Clone, Default)]
pub struct ActionTree {
    nodes: IndexMap<String, ActionNode>,
}

impl ActionTree {
    /// The node at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&ActionNode> {
        let parsed = Path::parse(path);
        let (first, rest) = parsed.segments().split_first()?;
        let mut node = self.nodes.get(first.as_key().as_ref())?;
        for segment in rest {
            match node {
                ActionNode::Group(group) => node = group.nodes.get(segment.as_key().as_ref())?,
                ActionNode::Action(_) => return None,
            }
        }
        Some(node)
    }

    /// The wrapper at `path`, if `path` names an action.
    pub fn find(&self, path: &str) -> Option<Arc<ActionWrapper>> {
        match self.get(path)? {
            ActionNode::Action(wrapper) => Some(Arc::clone(wrapper)),
            ActionNode::Group(_) => None,
        }
    }

    /// The group at `path`, if `path` names a group.
    pub fn group(&self, path: &str) -> Option<&ActionTree> {
        match self.get(path)? {
            ActionNode::Group(group) => Some(group),
            ActionNode::Action(_) => None,
        }
    }

    /// Dotted paths of every registered action, depth first.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths(None, &mut out);
        out
    }

    fn collect_paths(&self, prefix: Option<&str>, out: &mut Vec<String>) {
        for (key, node) in &self.nodes {
            let path = join(prefix, key);
            match node {
                ActionNode::Action(_) => out.push(path),
                ActionNode::Group(group) => group.collect_paths(Some(&path), out),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Store `wrapper` at `segments`, creating groups along the way and
    /// replacing whatever was there.
    fn insert(&mut self, segments: &[Segment], wrapper: Arc<ActionWrapper>) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let key = head.as_key().into_owned();
        if rest.is_empty() {
            self.nodes.insert(key, ActionNode::Action(wrapper));
            return;
        }
        let node = self
            .nodes
            .entry(key)
            .or_insert_with(|| ActionNode::Group(ActionTree::default()));
        if matches!(node, ActionNode::Action(_)) {
            *node = ActionNode::Group(ActionTree::default());
        }
        if let ActionNode::Group(group) = node {
            group.insert(rest, wrapper);
        }
    }
}

impl std::fmt::Debug for ActionTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    }
}

/// Walk `spec` and install a wrapper for every action in `tree`.
///
/// For an entry under `parent` with key `name:state` (or just `state`):
/// - the state path is `parent.state`;
/// - the action path is `parent.<options.name | name | key>`;
/// - a nested spec recurses with `parent.state` as its prefix.
pub(crate) fn register(
    tree: &mut ActionTree,
    store: &WeakStore,
    parent: Option<&str>,
    spec: ActionSpec,
) {
    for (key, entry) in spec.into_entries() {
        let (explicit_name, state_key) = split_key(&key);
        let state_path = join(parent, state_key);

        match entry {
            SpecEntry::Action { handler, options } => {
                let action_name = options
                    .name
                    .clone()
                    .or_else(|| explicit_name.map(str::to_string))
                    .unwrap_or_else(|| key.clone());
                let action_path = join(parent, &action_name);
                tracing::debug!(
                    action = %action_path,
                    state = %state_path,
                    single = options.single,
                    dispatch_status = options.dispatch_status,
                    "Registered action"
                );
                let wrapper = ActionWrapper::new(
                    action_path.clone(),
                    state_path,
                    handler,
                    options,
                    store.clone(),
                );
                tree.insert(Path::parse(&action_path).segments(), Arc::new(wrapper));
            }
            SpecEntry::Group(nested) => register(tree, store, Some(&state_path), nested),
        }
    }
}
