//! Structured logging setup for Sensnet
//!
//! Every Sensnet crate logs through `tracing`. This crate installs the
//! global subscriber: an [`EnvFilter`] honouring `RUST_LOG`, console output
//! as JSON lines or pretty text, and an optional file layer backed by
//! `tracing-appender`.
//!
//! # Quick Start
//!
//! ```ignore
//! use sensnet_logging::{LogConfig, SubscriberBuilder};
//!
//! // JSON lines to stderr
//! let _guard = SubscriberBuilder::new().init();
//!
//! // Human-readable output while developing
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! Keep the returned guard alive for as long as file output should be
//! flushed.

pub mod config;

pub use config::{ConsoleConfig, FileConfig, LogConfig, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for configuring and installing the global subscriber
pub struct SubscriberBuilder {
    config: LogConfig,
}

impl SubscriberBuilder {
    /// Create a builder with the default configuration (JSON lines to the console)
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set or the log file
    /// cannot be opened.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => panic!("failed to install tracing subscriber: {}", e),
        }
    }

    /// Install the subscriber globally, reporting failure instead of panicking
    ///
    /// Returns the file writer's guard when file output is enabled.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)
                .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if self.config.console.enabled {
            layers.push(console_layer(&self.config.console));
        }

        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_writer(writer)
                    .boxed(),
            );
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Console output goes to stderr so it never interleaves with prompts on stdout
fn console_layer(config: &ConsoleConfig) -> BoxedLayer {
    if config.pretty {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(config.ansi)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .flatten_event(true)
            .boxed()
    }
}

/// Single files are truncated on start; rotated files are appended to
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;
    let writer = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            tracing_appender::non_blocking(File::create(path)?)
        }
        RotationStrategy::Daily => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            &config.directory,
            &config.prefix,
        )),
        RotationStrategy::Hourly => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::HOURLY,
            &config.directory,
            &config.prefix,
        )),
    };
    Ok(writer)
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    SubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for tests; a no-op if a subscriber is already installed
pub fn init_testing() {
    let _ = SubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = SubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(!builder.config().console.pretty);
    }

    #[test]
    fn test_builder_with_config() {
        let builder = SubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config().default_level, "debug");
        assert!(builder.config().console.pretty);
    }

    #[test]
    fn test_builder_setters() {
        let builder = SubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_file_output(FileConfig::default());
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
        assert!(builder.config().file.is_some());
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("nested"),
            prefix: "unit".to_string(),
            rotation: RotationStrategy::Never,
        };
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(dir.path().join("nested").join("unit.log").exists());
    }
}
