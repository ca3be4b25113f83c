//! Subscriber setup for hosts embedding the engine
//!
//! The engine only emits `tracing` events under the `liftrs` target.
//! `init_logging` installs a global subscriber from the `[logging]` section
//! of `EngineConfig`: one console layer in the configured format, plus a JSON
//! file layer when `file_path` is set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// `[logging]` section of the engine config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Console format; the file layer is always JSON
    pub format: LogFormat,
    /// Also write events to this file
    pub file_path: Option<PathBuf>,
    /// Start a new file each day, suffixed with the date
    pub rotation: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive for engine events when `RUST_LOG` is not set
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "liftrs=error",
            LogLevel::Warn => "liftrs=warn",
            LogLevel::Info => "liftrs=info",
            LogLevel::Debug => "liftrs=debug",
            LogLevel::Trace => "liftrs=trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

fn file_appender(path: &Path, rotation: bool) -> anyhow::Result<RollingFileAppender> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path {} has no file name", path.display()))?;
    std::fs::create_dir_all(directory)?;

    Ok(if rotation {
        rolling::daily(directory, file_name)
    } else {
        rolling::never(directory, file_name)
    })
}

/// Install the global subscriber described by `config`
///
/// Fails if a global subscriber is already set or the log file cannot be
/// opened.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

    let console = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let file = match &config.file_path {
        Some(path) => Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(file_appender(path, config.rotation)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::info!(
        level = ?config.level,
        format = ?config.format,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_maps_to_engine_directive() {
        assert_eq!(LogLevel::Debug.directive(), "liftrs=debug");
        assert_eq!(LogConfig::default().level.directive(), "liftrs=info");
    }

    #[test]
    fn test_logging_section_deserializes() {
        let config: LogConfig = toml::from_str(
            r#"
            level = "warn"
            format = "json"
            file_path = "logs/engine.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_path, Some(PathBuf::from("logs/engine.log")));
        assert!(config.rotation);
    }

    #[test]
    fn test_init_logging_creates_json_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.log");
        let config = LogConfig {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            file_path: Some(path.clone()),
            rotation: false,
        };

        init_logging(&config).unwrap();
        assert!(path.exists());

        // a second global subscriber is refused
        assert!(init_logging(&LogConfig::default()).is_err());
    }
}
