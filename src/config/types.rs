use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::{AutoSaveOptions, FileStorage, DEFAULT_AUTOSAVE_KEY, DEFAULT_DEBOUNCE_MS};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Debounced persistence of the whole state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Persist on every committed change (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Storage key the state is written under (default: "appState").
    #[serde(default = "default_key")]
    pub key: String,
    /// Trailing-edge delay in milliseconds (default: 200).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Where persisted blobs live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one `<key>.json` per key. Defaults to the
    /// platform data directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_key() -> String {
    DEFAULT_AUTOSAVE_KEY.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: default_key(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AutoSaveConfig {
    pub fn options(&self) -> AutoSaveOptions {
        AutoSaveOptions {
            key: self.key.clone(),
            debounce_ms: self.debounce_ms,
        }
    }
}

impl StoreConfig {
    /// The configured storage directory, or the platform default.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(FileStorage::default_dir)
    }
}
