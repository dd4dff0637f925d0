//! The metadata tree that runs parallel to form data.
//!
//! Every node is a map tagged `"type": "field"` with its flags. A node for
//! a list carries `items` (one node per element); a node for a map carries
//! `fields` (one node per key). The root node describes the whole form.

use crate::lens::{Path, Segment};
use crate::tree::{Tree, TreeMap};

const TYPE: &str = "type";
const FIELD: &str = "field";
const DIRTY: &str = "dirty";
const TOUCHED: &str = "touched";
const FOCUS: &str = "focus";
const VALIDATING: &str = "validating";
const ERROR: &str = "error";
const WARNING: &str = "warning";
const INITIAL_DATA: &str = "initialData";
pub(crate) const ITEMS: &str = "items";
pub(crate) const FIELDS: &str = "fields";
const VALID: &str = "valid";
const VALIDATE_ON_SUBMIT: &str = "validateOnSubmit";

/// Flags of one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMeta {
    pub dirty: bool,
    pub touched: bool,
    pub focus: bool,
    pub validating: bool,
    pub error: Option<Tree>,
    pub warning: Option<Tree>,
    /// Value before the first write; `Some(Tree::Null)` if the field did
    /// not exist yet.
    pub initial_data: Option<Tree>,
}

impl FieldMeta {
    pub fn from_tree(node: &Tree) -> Self {
        Self {
            dirty: flag(node, DIRTY),
            touched: flag(node, TOUCHED),
            focus: flag(node, FOCUS),
            validating: flag(node, VALIDATING),
            error: present(node, ERROR),
            warning: present(node, WARNING),
            initial_data: node.get(INITIAL_DATA).cloned(),
        }
    }

    /// `node` with these flags written over it. `items`, `fields` and any
    /// unknown keys are kept.
    pub fn write_into(&self, node: &Tree) -> Tree {
        let mut map = node.as_map().cloned().unwrap_or_default();
        map.insert(TYPE.to_string(), Tree::from(FIELD));
        map.insert(DIRTY.to_string(), Tree::from(self.dirty));
        map.insert(TOUCHED.to_string(), Tree::from(self.touched));
        map.insert(FOCUS.to_string(), Tree::from(self.focus));
        map.insert(VALIDATING.to_string(), Tree::from(self.validating));
        put(&mut map, ERROR, self.error.clone());
        put(&mut map, WARNING, self.warning.clone());
        put(&mut map, INITIAL_DATA, self.initial_data.clone());
        Tree::from_map(map)
    }
}

/// Form-level status, stored on the root node.
#[derive(Debug, Clone, PartialEq)]
pub struct FormMeta {
    pub validating: bool,
    pub valid: bool,
    pub error: Option<Tree>,
    pub warning: Option<Tree>,
    pub validate_on_submit: bool,
}

impl Default for FormMeta {
    fn default() -> Self {
        Self {
            validating: false,
            valid: true,
            error: None,
            warning: None,
            validate_on_submit: false,
        }
    }
}

impl FormMeta {
    pub fn from_tree(root: &Tree) -> Self {
        Self {
            validating: flag(root, VALIDATING),
            valid: root.get(VALID).and_then(Tree::as_bool).unwrap_or(true),
            error: present(root, ERROR),
            warning: present(root, WARNING),
            validate_on_submit: flag(root, VALIDATE_ON_SUBMIT),
        }
    }

    pub fn write_into(&self, root: &Tree) -> Tree {
        let mut map = root.as_map().cloned().unwrap_or_default();
        map.insert(VALIDATING.to_string(), Tree::from(self.validating));
        map.insert(VALID.to_string(), Tree::from(self.valid));
        map.insert(VALIDATE_ON_SUBMIT.to_string(), Tree::from(self.validate_on_submit));
        put(&mut map, ERROR, self.error.clone());
        put(&mut map, WARNING, self.warning.clone());
        Tree::from_map(map)
    }
}

fn flag(node: &Tree, key: &str) -> bool {
    node.get(key).and_then(Tree::as_bool).unwrap_or(false)
}

fn present(node: &Tree, key: &str) -> Option<Tree> {
    node.get(key).filter(|value| !value.is_null()).cloned()
}

fn put(map: &mut TreeMap, key: &str, value: Option<Tree>) {
    match value {
        Some(value) => {
            map.insert(key.to_string(), value);
        }
        None => {
            map.shift_remove(key);
        }
    }
}

/// A fresh node shaped after `value`.
pub(crate) fn node_for(value: &Tree) -> Tree {
    let node = FieldMeta::default().write_into(&Tree::map());
    let mut map = node.as_map().cloned().unwrap_or_default();
    match value {
        Tree::List(items) => {
            map.insert(
                ITEMS.to_string(),
                Tree::from_list(items.iter().map(node_for).collect()),
            );
        }
        Tree::Map(fields) => {
            map.insert(
                FIELDS.to_string(),
                Tree::from_map(
                    fields
                        .iter()
                        .map(|(key, child)| (key.clone(), node_for(child)))
                        .collect(),
                ),
            );
        }
        _ => {}
    }
    Tree::from_map(map)
}

/// The metadata path of the field at `data`: map keys go through
/// `fields`, list indices through `items`.
pub(crate) fn meta_path(data: &Path) -> Path {
    let mut segments = Vec::with_capacity(data.segments().len() * 2);
    for segment in data.segments() {
        match segment {
            Segment::Key(key) => {
                segments.push(Segment::Key(FIELDS.to_string()));
                segments.push(Segment::Key(key.clone()));
            }
            Segment::Index(index) => {
                segments.push(Segment::Key(ITEMS.to_string()));
                segments.push(Segment::Index(*index));
            }
        }
    }
    Path::from_segments(segments)
}

/// Drop every `error`/`warning` and clear `validating`, recursively.
pub(crate) fn clear_validation(node: &Tree) -> Tree {
    let Some(map) = node.as_map() else {
        return node.clone();
    };
    let mut map = map.clone();
    map.shift_remove(ERROR);
    map.shift_remove(WARNING);
    if map.contains_key(VALIDATING) {
        map.insert(VALIDATING.to_string(), Tree::from(false));
    }
    if let Some(items) = map.get(ITEMS).and_then(Tree::as_list) {
        let items = items.iter().map(clear_validation).collect();
        map.insert(ITEMS.to_string(), Tree::from_list(items));
    }
    if let Some(fields) = map.get(FIELDS).and_then(Tree::as_map) {
        let fields = fields
            .iter()
            .map(|(key, child)| (key.clone(), clear_validation(child)))
            .collect();
        map.insert(FIELDS.to_string(), Tree::from_map(fields));
    }
    Tree::from_map(map)
}

/// First error and first warning under `root`, depth first: a node's own
/// status, then its items in order, then its fields in order. The root's
/// own status is not considered. Stops once both are found.
pub(crate) fn aggregate(root: &Tree) -> (Option<Tree>, Option<Tree>) {
    let mut error = None;
    let mut warning = None;
    visit_children(root, &mut error, &mut warning);
    (error, warning)
}

fn visit_children(node: &Tree, error: &mut Option<Tree>, warning: &mut Option<Tree>) -> bool {
    if let Some(items) = node.get(ITEMS).and_then(Tree::as_list) {
        for item in items {
            if visit(item, error, warning) {
                return true;
            }
        }
    }
    if let Some(fields) = node.get(FIELDS).and_then(Tree::as_map) {
        for child in fields.values() {
            if visit(child, error, warning) {
                return true;
            }
        }
    }
    false
}

fn visit(node: &Tree, error: &mut Option<Tree>, warning: &mut Option<Tree>) -> bool {
    if error.is_none() {
        *error = present(node, ERROR);
    }
    if warning.is_none() {
        *warning = present(node, WARNING);
    }
    if error.is_some() && warning.is_some() {
        return true;
    }
    visit_children(node, error, warning)
}
