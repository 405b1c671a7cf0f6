use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log file path: {0}")]
    InvalidPath(String),
    #[error("failed to initialise tracing subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber. `GANGWAY_LOG` overrides the flag-derived
/// filter with a full tracing directive. Without a file, output goes to
/// stderr; the interactive view owns stdout. The returned guard must stay
/// alive for file logging to flush.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = EnvFilter::try_from_env("GANGWAY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    match &config.file {
        Some(path) => {
            let directory = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|err| LoggingError::Init(err.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init()
                .map_err(|err| LoggingError::Init(err.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_filter_directives() {
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
        assert_eq!(LogLevel::Trace.as_directive(), "trace");
    }

    #[test]
    fn init_rejects_a_file_path_with_no_file_name() {
        let config = LogConfig {
            level: LogLevel::Warn,
            file: Some(PathBuf::from("/tmp/..")),
        };
        assert!(matches!(init(&config), Err(LoggingError::InvalidPath(_))));
    }
}
