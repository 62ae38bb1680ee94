//! # Observability
//!
//! Centralized tracing setup for the session-guard workspace.
//!
//! Crates are **log producers**. They use the standard `tracing` macros and
//! never decide where logs end up. The binary calls [`init`] or
//! [`init_with_config`] once at startup.
//!
//! ## Sinks
//!
//! - Compact human-readable output on stderr (always available).
//! - Structured JSONL appended to `~/.session-guard/logs/session.jsonl`
//!   when [`LogConfig::file_sink`] is enabled. Fields whose names look like
//!   credentials are redacted before they are written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("session-cli");
//!     tracing::info!("ready");
//! }
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use json_layer::{is_sensitive_field, LogEntry, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "session-cli").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Write structured JSONL to a log file.
    pub file_sink: bool,

    /// Optional custom log file path.
    /// Defaults to `~/.session-guard/logs/session.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            file_sink: false,
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// ```rust,ignore
/// observability::init_with_config(observability::LogConfig {
///     service_name: "session-cli".into(),
///     default_level: "debug".into(),
///     file_sink: true,
///     ..Default::default()
/// });
/// ```
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_config(config: LogConfig) {
    if config.file_sink {
        file_sink::init_file_subscriber(&config);
        return;
    }

    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .finish()
        .try_init();
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
