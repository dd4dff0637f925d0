//! Messages dispatched to the store.

use crate::tree::Tree;

/// How the default reducer should apply an intent's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Shallow-merge a map payload into the root.
    Merge,
    /// Replace the subtree at this path.
    Path(String),
    /// Leave the tree alone but tell observers that action status changed.
    Status,
}

/// A dispatched message.
///
/// Intents carrying a [`Patch`] are handled by the built-in reducer; all
/// others go to the custom reducer, if one is installed.
#[derive(Debug, Clone)]
pub struct Intent {
    /// Descriptive type, e.g. the dotted action path that produced it.
    pub kind: String,
    pub patch: Option<Patch>,
    pub payload: Tree,
}

impl Intent {
    /// A custom intent for the custom reducer.
    pub fn new(kind: impl Into<String>, payload: impl Into<Tree>) -> Self {
        Self {
            kind: kind.into(),
            patch: None,
            payload: payload.into(),
        }
    }

    pub fn merge(changes: Tree) -> Self {
        Self {
            kind: "merge".to_string(),
            patch: Some(Patch::Merge),
            payload: changes,
        }
    }

    pub fn write(kind: impl Into<String>, path: impl Into<String>, payload: Tree) -> Self {
        Self {
            kind: kind.into(),
            patch: Some(Patch::Path(path.into())),
            payload,
        }
    }

    pub fn status() -> Self {
        Self {
            kind: "@status".to_string(),
            patch: Some(Patch::Status),
            payload: Tree::Null,
        }
    }

    pub fn is_status(&self) -> bool {
        self.patch == Some(Patch::Status)
    }
}
