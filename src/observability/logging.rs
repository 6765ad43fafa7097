//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Default filter when neither settings nor env name one.
const DEFAULT_FILTER: &str = "newsdedup=info,warn";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Line format.
    pub format: LogFormat,
    /// Level filter.
    pub filter: EnvFilter,
    /// Optional file to append to instead of stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `RUST_LOG` | Filter directive, highest precedence |
    /// | `NEWSDEDUP_LOG_LEVEL` | Filter directive |
    /// | `NEWSDEDUP_LOG_FORMAT` | `pretty` or `json` |
    /// | `NEWSDEDUP_LOG_FILE` | Append to this file |
    ///
    /// `verbose` raises the default to `newsdedup=debug` when nothing else
    /// names a level.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let format = std::env::var("NEWSDEDUP_LOG_FORMAT")
            .ok()
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map_or_else(LogFormat::default, |f| LogFormat::parse(&f));

        let file = std::env::var("NEWSDEDUP_LOG_FILE")
            .ok()
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        let fallback = std::env::var("NEWSDEDUP_LOG_LEVEL")
            .ok()
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .unwrap_or_else(|| {
                if verbose {
                    "newsdedup=debug,info".to_string()
                } else {
                    DEFAULT_FILTER.to_string()
                }
            });
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&fallback))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        Self {
            format,
            filter,
            file,
        }
    }
}

/// Shared append-only log file; every writer handed out locks the same file.
#[derive(Clone)]
pub(super) struct AppendFile {
    file: Arc<Mutex<File>>,
}

impl AppendFile {
    /// Opens `path` for appending, creating it and its parent directory.
    pub(super) fn open(path: &Path) -> Result<Self> {
        let failed = |operation: &str, e: io::Error| Error::OperationFailed {
            operation: operation.to_string(),
            cause: format!("{}: {e}", path.display()),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| failed("create_log_dir", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| failed("open_log_file", e))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl<'a> MakeWriter<'a> for AppendFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
