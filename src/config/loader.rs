use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::StoreConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl StoreConfig {
    /// Returns the path to the configuration file.
    ///
    /// `~/.config/storelens/config.toml` on Linux, the platform equivalent
    /// elsewhere. Falls back to the current directory.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("storelens").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// A missing file yields `StoreConfig::default()`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(StoreConfig::default());
        }
        Self::load_from(&path)
    }

    /// Loads and validates configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: StoreConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The autosave key is not blank
    /// - A configured storage dir is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave.key.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "Autosave key must not be empty".to_string(),
            });
        }

        if let Some(dir) = &self.storage.dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "Storage dir must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_from_applies_defaults_for_missing_tables() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[autosave]\nenabled = true").unwrap();

        let config = StoreConfig::load_from(file.path()).unwrap();
        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.key, "appState");
        assert_eq!(config.autosave.debounce_ms, 200);
        assert_eq!(config.storage.dir, None);
    }

    #[test]
    fn load_from_rejects_blank_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[autosave]\nkey = \"  \"").unwrap();

        match StoreConfig::load_from(file.path()) {
            Err(ConfigError::ValidationError { message }) => assert!(message.contains("key")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[autosave\n").unwrap();

        match StoreConfig::load_from(file.path()) {
            Err(ConfigError::ParseError { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
