//! Diagnostics for the `storelens` binary.
//!
//! Command output goes to stdout, so logs never do: they go to stderr, or
//! are appended to the file named by [`LOG_ENV`].

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable naming a log file to append to.
pub const LOG_ENV: &str = "STORELENS_LOG";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    pub fn from_env() -> Self {
        Self::from_value(std::env::var_os(LOG_ENV))
    }

    fn from_value(value: Option<OsString>) -> Self {
        match value {
            Some(path) if !path.is_empty() => LogTarget::File(PathBuf::from(path)),
            _ => LogTarget::Stderr,
        }
    }
}

/// Filter directive for `-v` repeated `verbosity` times.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the level picked by `verbosity`. Fails only when
/// the log file cannot be opened; a subscriber installed earlier is left
/// in place.
pub fn init_tracing(verbosity: u8) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    match LogTarget::from_env() {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer.with_writer(std::io::stderr))
                .try_init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer.with_writer(file).with_ansi(false))
                .try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "info");
        assert_eq!(default_directive(2), "debug");
        assert_eq!(default_directive(9), "trace");
    }

    #[test]
    fn empty_log_env_means_stderr() {
        assert_eq!(LogTarget::from_value(None), LogTarget::Stderr);
        assert_eq!(LogTarget::from_value(Some(OsString::new())), LogTarget::Stderr);
        assert_eq!(
            LogTarget::from_value(Some(OsString::from("/tmp/storelens.log"))),
            LogTarget::File(PathBuf::from("/tmp/storelens.log"))
        );
    }
}
