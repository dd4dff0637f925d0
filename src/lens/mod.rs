//! Path-addressed access into a [`Tree`].
//!
//! A path such as `a.b[2].c` is compiled once into a [`Lens`]: a getter and
//! a copy-on-write setter. Dot and bracket notation are interchangeable, so
//! `a.b[2].c` and `a.b.2.c` address the same node.

mod path;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::tree::{deep_equals, Tree, TreeMap};

pub use path::{Path, Segment};

/// Upper bound on cached lenses before the cache is flushed.
const LENS_CACHE_LIMIT: usize = 1024;

/// Most null slots a single write may pad onto a list. Indices further out
/// are stored under their string key instead.
const MAX_LIST_PADDING: usize = 1024;

static LENS_CACHE: LazyLock<Mutex<HashMap<String, Lens>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Compiled getter/setter pair for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lens {
    path: Arc<Path>,
}

impl Lens {
    /// Compile `path`, reusing a cached lens when the same text was seen
    /// before. Non-string paths (e.g. an index) are stringified first.
    pub fn compile(path: impl ToString) -> Lens {
        let raw = path.to_string();
        let mut cache = LENS_CACHE.lock();
        if let Some(lens) = cache.get(&raw) {
            return lens.clone();
        }
        if cache.len() >= LENS_CACHE_LIMIT {
            tracing::trace!(entries = cache.len(), "Flushing lens cache");
            cache.clear();
        }
        let lens = Lens::new(Path::parse(&raw));
        cache.insert(raw, lens.clone());
        lens
    }

    pub fn new(path: Path) -> Lens {
        Lens { path: Arc::new(path) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the node at this path, or `None` if any segment is absent.
    pub fn get<'a>(&self, root: &'a Tree) -> Option<&'a Tree> {
        self.path
            .segments()
            .iter()
            .try_fold(root, |node, segment| child(node, segment))
    }

    /// Return a new root with `value` stored at this path.
    ///
    /// Only the containers along the path are copied; every other branch
    /// keeps its identity. When the current node already deep-equals
    /// `value` the original root is returned unchanged.
    pub fn set(&self, root: &Tree, value: Tree) -> Tree {
        if self.get(root).is_some_and(|current| deep_equals(current, &value)) {
            return root.clone();
        }
        write(Some(root), self.path.segments(), value)
    }

    /// Apply `f` to the current node (or `None`) and store the result.
    pub fn update<F>(&self, root: &Tree, f: F) -> Tree
    where
        F: FnOnce(Option<&Tree>) -> Tree,
    {
        let next = f(self.get(root));
        self.set(root, next)
    }
}

fn child<'a>(node: &'a Tree, segment: &Segment) -> Option<&'a Tree> {
    match (node, segment) {
        (Tree::Map(map), segment) => map.get(segment.as_key().as_ref()),
        (Tree::List(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    }
}

fn write(node: Option<&Tree>, segments: &[Segment], value: Tree) -> Tree {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };

    match (node, head) {
        (Some(Tree::List(items)), Segment::Index(i)) if grown_len(items.len(), *i).is_some() => {
            let mut items = Vec::clone(items);
            if let Some(len) = grown_len(items.len(), *i) {
                items.resize(len, Tree::Null);
            }
            let next = write(Some(&items[*i]), rest, value);
            items[*i] = next;
            Tree::from_list(items)
        }
        (Some(Tree::List(items)), segment) => {
            // A named key, or an index too far past the end, turns the list
            // into a map keyed by index.
            let key = segment.as_key();
            let mut map: TreeMap = items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item.clone()))
                .collect();
            let next = write(map.get(key.as_ref()), rest, value);
            map.insert(key.into_owned(), next);
            Tree::from_map(map)
        }
        (Some(Tree::Map(map)), segment) => {
            let key = segment.as_key();
            let mut map = TreeMap::clone(map);
            let next = write(map.get(key.as_ref()), rest, value);
            map.insert(key.into_owned(), next);
            Tree::from_map(map)
        }
        // Missing or scalar: build a fresh container shaped by the segment.
        (_, Segment::Index(i)) if grown_len(0, *i).is_some() => {
            let mut items = vec![Tree::Null; *i + 1];
            items[*i] = write(None, rest, value);
            Tree::from_list(items)
        }
        (_, segment) => {
            let mut map = TreeMap::new();
            map.insert(segment.as_key().into_owned(), write(None, rest, value));
            Tree::from_map(map)
        }
    }
}

/// Length a list of `len` items needs so that `index` is addressable, or
/// `None` when that would pad more than [`MAX_LIST_PADDING`] nulls.
fn grown_len(len: usize, index: usize) -> Option<usize> {
    let needed = index.checked_add(1)?;
    if needed <= len {
        return Some(len);
    }
    (needed - len <= MAX_LIST_PADDING).then_some(needed)
}

/// Read `path` from `root`.
pub fn get<'a>(root: &'a Tree, path: impl ToString) -> Option<&'a Tree> {
    Lens::compile(path).get(root)
}

/// Write `value` at `path`, returning the new root.
pub fn set(root: &Tree, path: impl ToString, value: Tree) -> Tree {
    Lens::compile(path).set(root, value)
}
