//! Field arrays: list-valued fields whose metadata items move with them.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::form::meta::node_for;
use crate::form::{Form, FormError};
use crate::lens;
use crate::tree::{deep_equals, Tree};

/// Field-array operations addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    Append,
    Prepend,
    Push,
    Pop,
    Shift,
    Unshift,
    Remove,
    RemoveAt,
    Sort,
    Swap,
    RemoveAll,
    Move,
    Insert,
}

impl ArrayOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArrayOp::Append => "append",
            ArrayOp::Prepend => "prepend",
            ArrayOp::Push => "push",
            ArrayOp::Pop => "pop",
            ArrayOp::Shift => "shift",
            ArrayOp::Unshift => "unshift",
            ArrayOp::Remove => "remove",
            ArrayOp::RemoveAt => "removeAt",
            ArrayOp::Sort => "sort",
            ArrayOp::Swap => "swap",
            ArrayOp::RemoveAll => "removeAll",
            ArrayOp::Move => "move",
            ArrayOp::Insert => "insert",
        }
    }
}

impl FromStr for ArrayOp {
    type Err = FormError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let op = match name {
            "append" => ArrayOp::Append,
            "prepend" => ArrayOp::Prepend,
            "push" => ArrayOp::Push,
            "pop" => ArrayOp::Pop,
            "shift" => ArrayOp::Shift,
            "unshift" => ArrayOp::Unshift,
            "remove" => ArrayOp::Remove,
            "removeAt" => ArrayOp::RemoveAt,
            "sort" => ArrayOp::Sort,
            "swap" => ArrayOp::Swap,
            "removeAll" => ArrayOp::RemoveAll,
            "move" => ArrayOp::Move,
            "insert" => ArrayOp::Insert,
            other => return Err(FormError::UnsupportedOperation(other.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Comparator = Arc<dyn Fn(&Tree, &Tree) -> Ordering + Send + Sync>;

/// Sort order for [`FieldArray::sort`].
#[derive(Clone)]
pub enum SortBy {
    /// Order by the value at `prop` (a path) inside each item.
    Prop { prop: String, descending: bool },
    Compare(Comparator),
}

impl SortBy {
    pub fn prop(prop: impl Into<String>) -> Self {
        SortBy::Prop {
            prop: prop.into(),
            descending: false,
        }
    }

    pub fn compare<F>(compare: F) -> Self
    where
        F: Fn(&Tree, &Tree) -> Ordering + Send + Sync + 'static,
    {
        SortBy::Compare(Arc::new(compare))
    }

    fn ordering(&self, a: &Tree, b: &Tree) -> Ordering {
        match self {
            SortBy::Prop { prop, descending } => {
                let left = lens::get(a, prop).cloned().unwrap_or_default();
                let right = lens::get(b, prop).cloned().unwrap_or_default();
                let ord = left.compare(&right);
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            SortBy::Compare(compare) => compare(a, b),
        }
    }
}

/// Parses `"prop"`, `"prop:asc"` or `"prop:desc"`.
impl FromStr for SortBy {
    type Err = FormError;

    fn from_str(order: &str) -> Result<Self, Self::Err> {
        let (prop, direction) = order.split_once(':').unwrap_or((order, "asc"));
        if prop.is_empty() {
            return Err(FormError::InvalidSort(order.to_string()));
        }
        let descending = match direction {
            "asc" => false,
            "desc" => true,
            _ => return Err(FormError::InvalidSort(order.to_string())),
        };
        Ok(SortBy::Prop {
            prop: prop.to_string(),
            descending,
        })
    }
}

impl fmt::Debug for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Prop { prop, descending } => f
                .debug_struct("Prop")
                .field("prop", prop)
                .field("descending", descending)
                .finish(),
            SortBy::Compare(_) => f.write_str("Compare(..)"),
        }
    }
}

/// Operations on the list at one path.
///
/// Values and metadata items are edited together and always keep the same
/// length and order. A failing operation changes nothing.
#[derive(Clone)]
pub struct FieldArray {
    form: Form,
    path: String,
}

impl FieldArray {
    pub(crate) fn new(form: Form, path: String) -> Self {
        Self { form, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current values; a non-list value reads as a one-item list.
    pub fn values(&self) -> Vec<Tree> {
        coerce(&self.form.value(&self.path))
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, value: impl Into<Tree>) {
        let value = value.into();
        self.edit_ok(|values, items| {
            items.push(node_for(&value));
            values.push(value);
        });
    }

    pub fn push(&self, value: impl Into<Tree>) {
        self.append(value);
    }

    pub fn prepend(&self, value: impl Into<Tree>) {
        let value = value.into();
        self.edit_ok(|values, items| {
            items.insert(0, node_for(&value));
            values.insert(0, value);
        });
    }

    pub fn unshift(&self, value: impl Into<Tree>) {
        self.prepend(value);
    }

    pub fn pop(&self) -> Option<Tree> {
        self.edit_ok(|values, items| {
            items.pop();
            values.pop()
        })
    }

    pub fn shift(&self) -> Option<Tree> {
        self.edit_ok(|values, items| {
            if values.is_empty() {
                return None;
            }
            items.remove(0);
            Some(values.remove(0))
        })
    }

    /// Insert at `index`; `index == len` appends.
    pub fn insert(&self, index: usize, value: impl Into<Tree>) -> Result<(), FormError> {
        let value = value.into();
        self.edit(|values, items| {
            if index > values.len() {
                return Err(FormError::Index {
                    index,
                    len: values.len(),
                });
            }
            items.insert(index, node_for(&value));
            values.insert(index, value);
            Ok(())
        })
    }

    /// Remove every item deep-equal to `value`; returns how many went.
    pub fn remove(&self, value: &Tree) -> usize {
        self.edit_ok(|values, items| {
            let before = values.len();
            let keep: Vec<bool> = values.iter().map(|v| !deep_equals(v, value)).collect();
            let mut flags = keep.iter();
            values.retain(|_| flags.next().copied().unwrap_or(true));
            let mut flags = keep.iter();
            items.retain(|_| flags.next().copied().unwrap_or(true));
            before - values.len()
        })
    }

    pub fn remove_at(&self, index: usize) -> Result<Tree, FormError> {
        self.edit(|values, items| {
            check(index, values.len())?;
            items.remove(index);
            Ok(values.remove(index))
        })
    }

    pub fn remove_all(&self) {
        self.edit_ok(|values, items| {
            values.clear();
            items.clear();
        });
    }

    /// Move the item at `from` so it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<(), FormError> {
        self.edit(|values, items| {
            check(from, values.len())?;
            check(to, values.len())?;
            if from != to {
                let value = values.remove(from);
                values.insert(to, value);
                let item = items.remove(from);
                items.insert(to, item);
            }
            Ok(())
        })
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<(), FormError> {
        self.edit(|values, items| {
            check(a, values.len())?;
            check(b, values.len())?;
            if a != b {
                values.swap(a, b);
                items.swap(a, b);
            }
            Ok(())
        })
    }

    /// Stable sort of the values, carrying their metadata along.
    pub fn sort(&self, by: &SortBy) {
        self.edit_ok(|values, items| {
            let mut pairs: Vec<(Tree, Tree)> = values.drain(..).zip(items.drain(..)).collect();
            pairs.sort_by(|(a, _), (b, _)| by.ordering(a, b));
            for (value, item) in pairs {
                values.push(value);
                items.push(item);
            }
        });
    }

    /// Run the operation named `method` with loosely typed arguments.
    ///
    /// Returns the removed value for `pop`, `shift` and `removeAt`, the
    /// number of removed items for `remove`, and `Tree::Null` otherwise.
    pub fn apply(&self, method: &str, args: &[Tree]) -> Result<Tree, FormError> {
        let op: ArrayOp = method.parse()?;
        let arg = |position: usize| args.get(position).cloned().unwrap_or_default();
        let index = |position: usize| -> Result<usize, FormError> {
            args.get(position)
                .and_then(Tree::as_i64)
                .and_then(|i| usize::try_from(i).ok())
                .ok_or(FormError::InvalidArgument { op, position })
        };

        let result = match op {
            ArrayOp::Append => {
                self.append(arg(0));
                Tree::Null
            }
            ArrayOp::Push => {
                self.push(arg(0));
                Tree::Null
            }
            ArrayOp::Prepend => {
                self.prepend(arg(0));
                Tree::Null
            }
            ArrayOp::Unshift => {
                self.unshift(arg(0));
                Tree::Null
            }
            ArrayOp::Pop => self.pop().unwrap_or_default(),
            ArrayOp::Shift => self.shift().unwrap_or_default(),
            ArrayOp::Remove => Tree::from(self.remove(&arg(0))),
            ArrayOp::RemoveAt => self.remove_at(index(0)?)?,
            ArrayOp::RemoveAll => {
                self.remove_all();
                Tree::Null
            }
            ArrayOp::Insert => {
                self.insert(index(0)?, arg(1))?;
                Tree::Null
            }
            ArrayOp::Move => {
                self.move_item(index(0)?, index(1)?)?;
                Tree::Null
            }
            ArrayOp::Swap => {
                self.swap(index(0)?, index(1)?)?;
                Tree::Null
            }
            ArrayOp::Sort => {
                let order = arg(0);
                let by: SortBy = order
                    .as_str()
                    .ok_or_else(|| FormError::InvalidSort(order.to_string()))?
                    .parse()?;
                self.sort(&by);
                Tree::Null
            }
        };
        Ok(result)
    }

    fn edit<R>(
        &self,
        op: impl FnOnce(&mut Vec<Tree>, &mut Vec<Tree>) -> Result<R, FormError>,
    ) -> Result<R, FormError> {
        self.form.edit_array(&self.path, op)
    }

    fn edit_ok<R>(&self, op: impl FnOnce(&mut Vec<Tree>, &mut Vec<Tree>) -> R) -> R {
        match self
            .form
            .edit_array::<R, Infallible>(&self.path, |values, items| Ok(op(values, items)))
        {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for FieldArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldArray").field("path", &self.path).finish()
    }
}

fn check(index: usize, len: usize) -> Result<(), FormError> {
    if index < len {
        Ok(())
    } else {
        Err(FormError::Index { index, len })
    }
}

/// The value as a list: `Null` is empty, a scalar or map is one item.
pub(crate) fn coerce(value: &Tree) -> Vec<Tree> {
    match value {
        Tree::Null => Vec::new(),
        Tree::List(items) => Vec::clone(items),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_names_round_trip() {
        for name in ["append", "removeAt", "removeAll", "move", "insert"] {
            assert_eq!(name.parse::<ArrayOp>().unwrap().as_str(), name);
        }
        assert!(matches!(
            "splice".parse::<ArrayOp>(),
            Err(FormError::UnsupportedOperation(name)) if name == "splice"
        ));
    }

    #[test]
    fn sort_spec_parsing() {
        assert!(matches!(
            "age".parse::<SortBy>().unwrap(),
            SortBy::Prop { descending: false, .. }
        ));
        assert!(matches!(
            "age:desc".parse::<SortBy>().unwrap(),
            SortBy::Prop { descending: true, .. }
        ));
        assert!(matches!(
            "age:sideways".parse::<SortBy>(),
            Err(FormError::InvalidSort(_))
        ));
    }

    #[test]
    fn coerce_wraps_scalars() {
        assert!(coerce(&Tree::Null).is_empty());
        assert_eq!(coerce(&Tree::from(1)), vec![Tree::from(1)]);
    }
}
