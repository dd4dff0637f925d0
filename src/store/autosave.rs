//! Debounced persistence of the whole state.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::storage::Storage;
use crate::store::StoreError;
use crate::tree::Tree;

/// Storage key used when none is configured.
pub const DEFAULT_AUTOSAVE_KEY: &str = "appState";

/// Delay used when none is configured.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Where and how often the state is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveOptions {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_key() -> String {
    DEFAULT_AUTOSAVE_KEY.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl Default for AutoSaveOptions {
    fn default() -> Self {
        Self {
            key: default_key(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AutoSaveOptions {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Trailing-edge debouncer running on its own thread.
///
/// Every `call` restarts the delay; once the delay passes without a new
/// call, the most recent value is handed to the callback. Dropping the
/// debouncer flushes a pending value and joins the thread.
pub struct Debouncer<T: Send + 'static> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || debounce_loop(rx, delay, callback));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn call(&self, value: T) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(value);
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn debounce_loop<T, F>(rx: mpsc::Receiver<T>, delay: Duration, mut callback: F)
where
    F: FnMut(T),
{
    while let Ok(first) = rx.recv() {
        let mut pending = first;
        loop {
            match rx.recv_timeout(delay) {
                Ok(next) => pending = next,
                Err(RecvTimeoutError::Timeout) => {
                    callback(pending);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    callback(pending);
                    return;
                }
            }
        }
    }
}

/// Serialize `state` and write it under `key`.
pub fn save_state(storage: &dyn Storage, key: &str, state: &Tree) -> Result<(), StoreError> {
    let text = serde_json::to_string(state).map_err(StoreError::Serialize)?;
    storage.set(key, &text)?;
    Ok(())
}

/// Debounced writer owned by a store while autosave is enabled.
pub(crate) struct AutoSaver {
    options: AutoSaveOptions,
    debouncer: Arc<Debouncer<Tree>>,
}

impl AutoSaver {
    pub(crate) fn start(
        options: AutoSaveOptions,
        storage: Arc<dyn Storage>,
        last_error: Arc<Mutex<Option<String>>>,
    ) -> Self {
        let key = options.key.clone();
        let debouncer = Debouncer::new(options.debounce(), move |state: Tree| {
            match save_state(storage.as_ref(), &key, &state) {
                Ok(()) => {
                    tracing::debug!(key = %key, "Autosaved state");
                    last_error.lock().take();
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Autosave failed");
                    *last_error.lock() = Some(e.to_string());
                }
            }
        });
        Self {
            options,
            debouncer: Arc::new(debouncer),
        }
    }

    pub(crate) fn options(&self) -> &AutoSaveOptions {
        &self.options
    }

    pub(crate) fn debouncer(&self) -> Arc<Debouncer<Tree>> {
        Arc::clone(&self.debouncer)
    }
}
