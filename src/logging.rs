//! Structured logging through `tracing`.
//!
//! Output always goes to stderr so stdout stays clean for `tree --json`.

use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Result, TreeError};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "FTS_LOG";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber. `level` is an `EnvFilter` directive and is
/// ignored when `FTS_LOG` is set.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter = build_filter(level)?;
    let base = Registry::default().with(filter);

    let installed = match format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| TreeError::Config(format!("Failed to install logger: {}", e)))
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| TreeError::Config(format!("Invalid log level \"{}\": {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_levels_parse() {
        for level in ["off", "warn", "info", "file_tree_sync=debug,warn"] {
            assert!(EnvFilter::try_new(level).is_ok(), "{}", level);
        }
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert!(matches!(
            build_filter("file_tree_sync=loud"),
            Err(TreeError::Config(_))
        ));
    }
}
