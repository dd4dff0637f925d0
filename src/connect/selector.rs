//! Deep-equality memoization for derived values.

use parking_lot::Mutex;

use crate::tree::{deep_equals, Tree};

/// Caches the last `(input, output)` pair of a derivation.
///
/// `select` recomputes only when the input differs (by value) from the
/// previous one; otherwise the cached output is returned and, because
/// containers are shared, it keeps its identity.
pub struct Selector<F> {
    derive: F,
    last: Mutex<Option<(Tree, Tree)>>,
}

impl<F> Selector<F>
where
    F: Fn(&Tree) -> Tree,
{
    pub fn new(derive: F) -> Self {
        Self {
            derive,
            last: Mutex::new(None),
        }
    }

    pub fn select(&self, input: &Tree) -> Tree {
        let mut last = self.last.lock();
        if let Some((previous, output)) = last.as_ref() {
            if deep_equals(previous, input) {
                return output.clone();
            }
        }
        let output = (self.derive)(input);
        *last = Some((input.clone(), output.clone()));
        output
    }

    /// Forget the cached pair.
    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn recomputes_only_on_value_change() {
        let runs = AtomicUsize::new(0);
        let selector = Selector::new(|input: &Tree| {
            runs.fetch_add(1, Ordering::SeqCst);
            Tree::from(vec![input.clone()])
        });

        let first = selector.select(&Tree::from(json!({"id": 1})));
        let again = selector.select(&Tree::from(json!({"id": 1})));
        assert!(Tree::same(&first, &again));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        selector.select(&Tree::from(json!({"id": 2})));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        selector.reset();
        selector.select(&Tree::from(json!({"id": 2})));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
