//! Shared test utilities.

#![allow(dead_code, unused_imports)]

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storelens::{ActionError, FileStorage, Tree};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Shorthand for building trees from `json!` literals.
pub fn t(value: serde_json::Value) -> Tree {
    Tree::from(value)
}

/// A file storage rooted in a fresh temporary directory.
pub fn temp_storage() -> (TempDir, Arc<FileStorage>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Arc::new(FileStorage::new(temp_dir.path()));
    (temp_dir, storage)
}

/// Thread-safe hit counter.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Futures whose results are released by the test, one per call.
///
/// `next()` hands out a future for a handler to return; `release(i, v)`
/// resolves the `i`th one.
#[derive(Clone, Default)]
pub struct Gates {
    senders: Arc<Mutex<Vec<Option<oneshot::Sender<Result<Tree, ActionError>>>>>>,
}

impl Gates {
    pub fn next(&self) -> impl Future<Output = Result<Tree, ActionError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.senders.lock().push(Some(tx));
        async move {
            rx.await
                .unwrap_or_else(|_| Err(ActionError::msg("gate dropped")))
        }
    }

    pub fn opened(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn release(&self, index: usize, result: Result<Tree, ActionError>) {
        let sender = self.senders.lock()[index]
            .take()
            .expect("gate already released");
        let _ = sender.send(result);
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
