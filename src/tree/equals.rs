//! Structural equality.
//!
//! Used to skip writes that would not change anything. A false "not equal"
//! only costs a redundant write; a false "equal" would drop a real change,
//! so every container is compared all the way down.

use std::sync::Arc;

use super::Tree;

/// Deep value equality across maps, lists and scalars.
///
/// Shared containers short-circuit to `true`. Map comparison ignores key
/// order. Numbers compare by value, so `1` equals `1.0`.
pub fn deep_equals(a: &Tree, b: &Tree) -> bool {
    match (a, b) {
        (Tree::Null, Tree::Null) => true,
        (Tree::Bool(x), Tree::Bool(y)) => x == y,
        (Tree::Number(x), Tree::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Tree::String(x), Tree::String(y)) => x == y,
        (Tree::List(x), Tree::List(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equals(l, r))
        }
        (Tree::Map(x), Tree::Map(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_equals(v, other)))
        }
        _ => false,
    }
}
