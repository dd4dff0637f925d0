//! Persistent nested data.
//!
//! A [`Tree`] is JSON-shaped, but its containers are reference counted so
//! that a copy-on-write edit can share every branch it does not touch.
//! Cloning a tree is always cheap.

mod equals;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub use equals::deep_equals;

/// Ordered map used for [`Tree::Map`] nodes.
pub type TreeMap = IndexMap<String, Tree>;

/// A nested value in the state tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Tree {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    List(Arc<Vec<Tree>>),
    Map(Arc<TreeMap>),
}

impl Tree {
    /// An empty map node.
    pub fn map() -> Self {
        Tree::Map(Arc::new(TreeMap::new()))
    }

    /// An empty list node.
    pub fn list() -> Self {
        Tree::List(Arc::new(Vec::new()))
    }

    pub fn from_map(map: TreeMap) -> Self {
        Tree::Map(Arc::new(map))
    }

    pub fn from_list(items: Vec<Tree>) -> Self {
        Tree::List(Arc::new(items))
    }

    /// Identity check.
    ///
    /// Containers are the same when they share an allocation; scalars are
    /// the same when they are equal. This is what subscribers use to decide
    /// whether a branch changed.
    pub fn same(a: &Tree, b: &Tree) -> bool {
        match (a, b) {
            (Tree::List(x), Tree::List(y)) => Arc::ptr_eq(x, y),
            (Tree::Map(x), Tree::Map(y)) => Arc::ptr_eq(x, y),
            (Tree::String(x), Tree::String(y)) => x == y,
            (Tree::Number(x), Tree::Number(y)) => x == y,
            (Tree::Bool(x), Tree::Bool(y)) => x == y,
            (Tree::Null, Tree::Null) => true,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tree::Null)
    }

    /// JavaScript-style truthiness: `null`, `false`, `0` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Tree::Null => false,
            Tree::Bool(b) => *b,
            Tree::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Tree::String(s) => !s.is_empty(),
            Tree::List(_) | Tree::Map(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tree::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tree::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tree::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tree]> {
        match self {
            Tree::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&TreeMap> {
        match self {
            Tree::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Child lookup by map key.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Child lookup by list index.
    pub fn at(&self, index: usize) -> Option<&Tree> {
        self.as_list().and_then(|items| items.get(index))
    }

    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    /// Total ordering used for sorting.
    ///
    /// Values of different kinds order as
    /// `null < bool < number < string < list < map`.
    pub fn compare(&self, other: &Tree) -> Ordering {
        fn rank(t: &Tree) -> u8 {
            match t {
                Tree::Null => 0,
                Tree::Bool(_) => 1,
                Tree::Number(_) => 2,
                Tree::String(_) => 3,
                Tree::List(_) => 4,
                Tree::Map(_) => 5,
            }
        }

        match (self, other) {
            (Tree::Bool(a), Tree::Bool(b)) => a.cmp(b),
            (Tree::Number(a), Tree::Number(b)) => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Tree::String(a), Tree::String(b)) => a.cmp(b),
            (Tree::List(a), Tree::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Tree::Map(a), Tree::Map(b)) => a.len().cmp(&b.len()),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        deep_equals(self, other)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Tree::Null,
            Value::Bool(b) => Tree::Bool(b),
            Value::Number(n) => Tree::Number(n),
            Value::String(s) => Tree::String(Arc::from(s)),
            Value::Array(items) => Tree::List(Arc::new(items.into_iter().map(Tree::from).collect())),
            Value::Object(map) => Tree::Map(Arc::new(
                map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect(),
            )),
        }
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        match tree {
            Tree::Null => Value::Null,
            Tree::Bool(b) => Value::Bool(b),
            Tree::Number(n) => Value::Number(n),
            Tree::String(s) => Value::String(s.to_string()),
            Tree::List(items) => Value::Array(items.iter().cloned().map(Value::from).collect()),
            Tree::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Tree {
    fn from(b: bool) -> Self {
        Tree::Bool(b)
    }
}

impl From<i64> for Tree {
    fn from(n: i64) -> Self {
        Tree::Number(n.into())
    }
}

impl From<i32> for Tree {
    fn from(n: i32) -> Self {
        Tree::Number(n.into())
    }
}

impl From<u64> for Tree {
    fn from(n: u64) -> Self {
        Tree::Number(n.into())
    }
}

impl From<usize> for Tree {
    fn from(n: usize) -> Self {
        Tree::Number((n as u64).into())
    }
}

impl From<f64> for Tree {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Tree::Number).unwrap_or(Tree::Null)
    }
}

impl From<&str> for Tree {
    fn from(s: &str) -> Self {
        Tree::String(Arc::from(s))
    }
}

impl From<String> for Tree {
    fn from(s: String) -> Self {
        Tree::String(Arc::from(s))
    }
}

impl From<Vec<Tree>> for Tree {
    fn from(items: Vec<Tree>) -> Self {
        Tree::from_list(items)
    }
}

impl From<TreeMap> for Tree {
    fn from(map: TreeMap) -> Self {
        Tree::from_map(map)
    }
}

impl<T: Into<Tree>> From<Option<T>> for Tree {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Tree::Null)
    }
}
