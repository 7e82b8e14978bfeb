//! Shared logging setup for the schemaport binary.
//!
//! Logs always go to stderr so an exported document can be streamed to
//! stdout untouched.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Logging configuration resolved from CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Emit DEBUG level events
    pub debug: bool,
    /// Only emit ERROR level events
    pub quiet: bool,
    /// Use the JSON formatter instead of the human-readable one
    pub json: bool,
}

impl LoggingConfig {
    /// Creates a logging config at INFO level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable debug output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builder method to restrict output to errors.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Builder method to switch to JSON lines.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Level used when `RUST_LOG` is not set.
    pub fn level(&self) -> tracing::Level {
        match (self.quiet, self.debug) {
            (true, _) => tracing::Level::ERROR,
            (false, true) => tracing::Level::DEBUG,
            (false, false) => tracing::Level::INFO,
        }
    }
}

/// Initializes structured logging.
///
/// `RUST_LOG` takes precedence over the configured level when present.
///
/// # Example
/// ```rust,no_run
/// use schemaport_core::logging::{LoggingConfig, init_logging};
///
/// init_logging(LoggingConfig::new().with_debug(true)).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(config.debug)
        .with_line_number(config.debug);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| {
        crate::error::SchemaportError::configuration(format!(
            "Failed to initialize logging: {}",
            e
        ))
    })
}
