//! Observability: structured logging and Prometheus metrics.
//!
//! The library only emits `tracing` events and `metrics` samples; this module
//! is what the binary calls once at startup to route them somewhere.

mod logging;
mod metrics;

pub use logging::{LogFormat, LoggingConfig};
pub use metrics::{MetricsConfig, MetricsHandle, install_prometheus};

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use logging::AppendFile;
use std::io;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};

/// Full observability configuration.
#[derive(Debug)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Whether to serve metrics over HTTP.
    pub metrics_expose: bool,
}

/// Startup options taken from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// `-v` was given.
    pub verbose: bool,
    /// `--metrics` was given.
    pub metrics_expose: bool,
}

/// Keeps observability components alive for the life of the process.
#[derive(Debug)]
pub struct ObservabilityHandle {
    metrics: Option<MetricsHandle>,
}

impl ObservabilityHandle {
    /// Returns the metrics handle, if a recorder was installed.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }
}

type FmtLayer = Box<dyn Layer<Registry> + Send + Sync>;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initializes observability from environment variables only.
///
/// # Errors
///
/// Returns an error if observability is already initialized or a component
/// fails to start.
pub fn init_from_env(options: InitOptions) -> Result<ObservabilityHandle> {
    init(build_config(None, options))
}

/// Initializes observability from config file settings with env overrides.
///
/// # Errors
///
/// Returns an error if observability is already initialized or a component
/// fails to start.
pub fn init_from_config(
    settings: &ObservabilitySettings,
    options: InitOptions,
) -> Result<ObservabilityHandle> {
    init(build_config(Some(settings), options))
}

fn build_config(
    settings: Option<&ObservabilitySettings>,
    options: InitOptions,
) -> ObservabilityConfig {
    let mut metrics = MetricsConfig::from_settings(settings.and_then(|s| s.metrics.as_ref()));
    // Asking for the endpoint turns the recorder on.
    metrics.enabled |= options.metrics_expose;

    ObservabilityConfig {
        logging: LoggingConfig::from_settings(
            settings.and_then(|s| s.logging.as_ref()),
            options.verbose,
        ),
        metrics,
        metrics_expose: options.metrics_expose,
    }
}

/// Installs the metrics recorder and the global tracing subscriber.
///
/// Logs go to stderr unless a file is configured, so stdout stays clean for
/// JSON output.
///
/// # Errors
///
/// Returns an error if observability is already initialized or a component
/// fails to start.
pub fn init(config: ObservabilityConfig) -> Result<ObservabilityHandle> {
    if INITIALIZED.get().is_some() {
        return Err(already_initialized());
    }

    let metrics = install_prometheus(&config.metrics, config.metrics_expose)?;
    let layer = fmt_layer(&config.logging)?;

    tracing_subscriber::registry()
        .with(layer)
        .with(config.logging.filter)
        .try_init()
        .map_err(|e| Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: e.to_string(),
        })?;

    INITIALIZED.set(()).map_err(|()| already_initialized())?;
    Ok(ObservabilityHandle { metrics })
}

/// Picks the formatter and destination for log lines.
fn fmt_layer(logging: &LoggingConfig) -> Result<FmtLayer> {
    let layer = match (logging.format, &logging.file) {
        (LogFormat::Json, Some(path)) => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(AppendFile::open(path)?)
            .boxed(),
        (LogFormat::Json, None) => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(io::stderr)
            .boxed(),
        (LogFormat::Pretty, Some(path)) => fmt::layer()
            .with_ansi(false)
            .with_writer(AppendFile::open(path)?)
            .boxed(),
        (LogFormat::Pretty, None) => fmt::layer().with_writer(io::stderr).boxed(),
    };
    Ok(layer)
}

fn already_initialized() -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: "observability already initialized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingSettings;

    #[test]
    fn test_build_config_uses_settings() {
        let settings = ObservabilitySettings {
            logging: Some(LoggingSettings {
                format: Some("json".to_string()),
                level: None,
                file: None,
            }),
            metrics: None,
        };
        let config = build_config(Some(&settings), InitOptions::default());
        if std::env::var("NEWSDEDUP_LOG_FORMAT").is_err() {
            assert_eq!(config.logging.format, LogFormat::Json);
        }
        assert!(!config.metrics_expose);
    }

    #[test]
    fn test_metrics_flag_enables_recorder() {
        let config = build_config(
            None,
            InitOptions {
                verbose: false,
                metrics_expose: true,
            },
        );
        assert!(config.metrics.enabled);
        assert!(config.metrics_expose);
    }
}
