/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, SnapcopyError};

/// Target of `[DRY-RUN]` lines; a child of the crate target so the default
/// filter keeps them
pub const DRY_RUN_TARGET: &str = "snapcopy::dry_run";

/// Build the filter: `RUST_LOG` wins, otherwise `snapcopy=<level>`
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => default_filter(config),
    }
}

fn default_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level = config.level.to_tracing_level();
    EnvFilter::try_new(format!("snapcopy={}", level))
        .map_err(|e| SnapcopyError::Logging(format!("Failed to create log filter: {}", e)))
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(config)?;

    if let Some(ref log_path) = config.file {
        init_file_logging(log_path, env_filter)
    } else {
        init_stdout_logging(env_filter, config.format)
    }
}

/// Initialize logging to stdout
fn init_stdout_logging(env_filter: EnvFilter, format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
    };

    result.map_err(|e| SnapcopyError::Logging(e.to_string()))
}

/// Initialize logging to a file (always JSON)
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| SnapcopyError::Logging(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| SnapcopyError::Logging(e.to_string()))
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapcopy=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_filter_from_level() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };

        // Only checks that the directive is well-formed; installing a global
        // subscriber can happen once per process.
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_default_filter_keeps_dry_run_lines() {
        let filter = default_filter(&LoggingConfig::default()).unwrap();
        let subscriber = tracing_subscriber::registry().with(filter);

        let enabled = tracing::subscriber::with_default(subscriber, || {
            tracing::enabled!(target: DRY_RUN_TARGET, tracing::Level::INFO)
        });
        assert!(enabled);
    }

    #[test]
    fn test_missing_log_directory_fails() {
        let config = LoggingConfig {
            file: Some("/nonexistent-dir/snapcopy/run.log".into()),
            ..Default::default()
        };

        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, SnapcopyError::Logging(_)));
    }

    #[test]
    fn test_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}
