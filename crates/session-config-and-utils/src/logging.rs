//! Logging initialization.
//!
//! Thin wrapper over the observability package so every binary in the
//! workspace configures tracing the same way.

use crate::{Config, Paths};
use observability::LogConfig;

/// Initialize the logging system for a service.
///
/// - Level from `RUST_LOG` or the configured default
/// - Compact stderr output
/// - JSONL file under the logs directory when `log_to_file` is set
///
/// ```ignore
/// init_logging("session-cli", &config, &paths);
/// tracing::info!("started");
/// ```
pub fn init_logging(service_name: &str, config: &Config, paths: &Paths) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(&config.log_level).to_string().to_lowercase(),
        file_sink: config.log_to_file,
        log_path: Some(paths.log_file()),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), tracing::Level::TRACE);
        assert_eq!(parse_level("Debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
