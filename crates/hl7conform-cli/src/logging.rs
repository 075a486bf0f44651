//! Logging set-up using `tracing` and `tracing-subscriber`.
//!
//! Diagnostics go to stderr so they never mix with report data on stdout.
//! The `HL7CONFORM_LOG` environment variable takes an `EnvFilter` directive
//! string and overrides `--log-level` when set.
//!
//! # Log Levels
//!
//! - `warn`: set-up problems that do not stop the run (default)
//! - `info`: inputs loaded, validation started and finished
//! - `debug`: per-phase finding counts, mapping strategy
//! - `trace`: everything the core emits
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::cli::{LogFormat, LogLevel};

/// Environment variable holding a filter directive string.
pub const LOG_ENV: &str = "HL7CONFORM_LOG";

/// Configuration for logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the workspace's own targets.
    pub level: Level,
    /// Output layout.
    pub format: LogFormat,
    /// Whether to use ANSI colors in compact output.
    pub with_ansi: bool,
}

impl LogConfig {
    /// Builds the configuration from the global CLI flags.
    pub fn from_flags(level: LogLevel, format: LogFormat, no_color: bool) -> Self {
        let level = match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        };
        Self {
            level,
            format,
            with_ansi: !no_color,
        }
    }
}

/// Installs the global subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), TryInitError> {
    init_logging_with_writer(config, std::io::stderr)
}

/// Installs the global subscriber with a custom writer.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W) -> Result<(), TryInitError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);
    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_writer(writer).with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(false)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    }
}

/// Builds the filter from `HL7CONFORM_LOG`, or from `level` for the
/// workspace's targets with everything else held at `warn`.
fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("warn,hl7conform={level},hl7conform_core={level}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn flags_map_to_levels() {
        let config = LogConfig::from_flags(LogLevel::Debug, LogFormat::Compact, true);
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.with_ansi);
        assert_eq!(
            LogConfig::from_flags(LogLevel::Error, LogFormat::Json, false).level,
            Level::ERROR
        );
    }

    #[test]
    fn default_directives_cover_both_crates() {
        let directives = default_directives(Level::INFO);
        assert_eq!(directives, "warn,hl7conform=info,hl7conform_core=info");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
