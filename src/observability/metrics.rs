//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use tokio::runtime::{Builder, Handle};

const DEFAULT_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether the recorder is installed at all.
    pub enabled: bool,
    /// Bind address of the scrape endpoint.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Builds metrics configuration from environment variables alone.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_settings(None)
    }

    /// Builds metrics configuration from config settings, then applies
    /// `NEWSDEDUP_METRICS_ENABLED` and `NEWSDEDUP_METRICS_PORT`.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let enabled = std::env::var("NEWSDEDUP_METRICS_ENABLED")
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .or_else(|| settings.and_then(|s| s.enabled))
            .unwrap_or(false);
        let port = std::env::var("NEWSDEDUP_METRICS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or_else(|| settings.and_then(|s| s.port))
            .unwrap_or(DEFAULT_PORT);

        Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

/// Handle to the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders current values in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder, plus an HTTP scrape endpoint when
/// `expose` is set. Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// endpoint cannot be started.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if expose {
        serve(builder.with_http_listener(config.listen_addr))?
    } else {
        builder
            .install_recorder()
            .map_err(|e| failed("metrics_recorder_install", e))?
    };

    tracing::debug!(expose, addr = %config.listen_addr, "Metrics recorder installed");
    Ok(Some(MetricsHandle { prometheus }))
}

/// Starts the scrape endpoint on the ambient tokio runtime. The CLI is
/// synchronous, so outside a runtime a single-threaded one is parked on a
/// background thread for the life of the process.
fn serve(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(runtime) = Handle::try_current() {
        return start_exporter(builder, &runtime);
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| failed("metrics_runtime_init", e))?;
    let prometheus = start_exporter(builder, runtime.handle())?;
    thread::Builder::new()
        .name("newsdedup-metrics".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| failed("metrics_runtime_thread", e))?;
    Ok(prometheus)
}

fn start_exporter(builder: PrometheusBuilder, runtime: &Handle) -> Result<PrometheusHandle> {
    // `build` binds the listener, which needs a reactor.
    let (recorder, exporter) = {
        let _entered = runtime.enter();
        builder
            .build()
            .map_err(|e| failed("metrics_exporter_build", e))?
    };
    let prometheus = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| failed("metrics_recorder_install", e))?;
    runtime.spawn(exporter);
    Ok(prometheus)
}

fn failed(operation: &str, cause: impl Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        let config = MetricsConfig {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        };
        assert!(install_prometheus(&config, false).unwrap().is_none());
    }

    #[test]
    fn test_settings_port() {
        let settings = MetricsSettings {
            enabled: Some(true),
            port: Some(9999),
        };
        let config = MetricsConfig::from_settings(Some(&settings));
        if std::env::var("NEWSDEDUP_METRICS_PORT").is_err() {
            assert_eq!(config.listen_addr.port(), 9999);
        }
    }

    #[test]
    fn test_recorder_renders_dedup_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("dedup_checks_total", "strategy" => "url", "result" => "hit")
                .increment(1);
        });
        assert!(handle.render().contains("dedup_checks_total"));
    }
}
