//! Logging system
//!
//! Installs a global `tracing` subscriber with an env filter and console
//! and/or rolling file output. The returned [`LoggingSystem`] owns the
//! non-blocking writer guard and must be kept alive for the process.

mod config;


pub use config::{default_log_directory, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File name prefix of rolled log files
pub const LOG_FILE_NAME: &str = "app-updater.log";

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationError(String),
}

pub type LoggingResult<T> = Result<T, LoggingError>;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Handle to the installed subscriber
pub struct LoggingSystem {
    config: LoggingConfig,
    _guards: Vec<WorkerGuard>,
}

impl LoggingSystem {
    /// Install the global subscriber described by `config`
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        let mut guards = Vec::new();
        let mut layers: Vec<BoxedLayer<tracing_subscriber::Registry>> = Vec::new();

        if matches!(config.output, LogOutput::Console | LogOutput::Both) {
            layers.push(Self::console_layer(&config));
        }
        if config.writes_file() {
            let (layer, guard) = Self::file_layer(&config)?;
            layers.push(layer);
            guards.push(guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(Self::build_env_filter(&config))
            .try_init()
            .map_err(|e| LoggingError::InitializationError(e.to_string()))?;

        Ok(Self {
            config,
            _guards: guards,
        })
    }

    /// Global level plus per-module directives
    pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
        let mut filter = EnvFilter::new(config.level.as_str());

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring log directive for {}: {}", module, e),
            }
        }

        filter
    }

    fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info);

        match config.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Text => layer.boxed(),
        }
    }

    fn file_layer<S>(config: &LoggingConfig) -> LoggingResult<(BoxedLayer<S>, WorkerGuard)>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let log_dir = config.resolved_log_directory();
        std::fs::create_dir_all(&log_dir).map_err(|e| {
            LoggingError::DirectoryCreationError(format!("{}: {}", log_dir.display(), e))
        })?;

        let rotation = match config.rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        };

        let appender = RollingFileAppender::new(rotation, &log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(config.include_target)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(false);

        let layer = match config.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Text => layer.boxed(),
        };
        Ok((layer, guard))
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }
}
