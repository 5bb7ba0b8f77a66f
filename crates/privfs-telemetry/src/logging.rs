//! Logging configuration and subscriber installation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON with the current span.
    Json,
    /// The `tracing-subscriber` default layout.
    Full,
}

impl LogFormat {
    /// Accepted spellings.
    pub const NAMES: [&'static str; 4] = ["pretty", "compact", "json", "full"];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::Config(format!(
                "unknown log format \"{other}\", expected one of {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Daily-rotated files in this directory.
    File(PathBuf),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level filter, e.g. `info`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Output.
    pub target: LogTarget,
    /// File name prefix when logging to files.
    pub file_prefix: String,
    /// ANSI colors (ignored for files).
    pub ansi: bool,
    /// Include thread names, which show the impersonated uid for
    /// privileged work.
    pub thread_names: bool,
    /// Per-target overrides, e.g. `privfs_bus=debug`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file_prefix: "privfs-worker".to_owned(),
            ansi: true,
            thread_names: false,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Config with the given base level and defaults elsewhere.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a per-target override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Parse the level and directives into a filter.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] on unparseable input.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::Config(e.to_string()))?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e| TelemetryError::Config(format!("directive \"{directive}\": {e}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LogGuard {
    _writer: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] for a bad filter,
/// [`TelemetryError::Io`] if the log directory cannot be created, and
/// [`TelemetryError::Init`] if a subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LogGuard> {
    let filter = config.filter()?;

    let (layer, guard) = match &config.target {
        LogTarget::Stdout => (fmt_layer(config, config.ansi, std::io::stdout), None),
        LogTarget::Stderr => (fmt_layer(config, config.ansi, std::io::stderr), None),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (fmt_layer(config, false, writer), Some(guard))
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(LogGuard { _writer: guard })
}

fn fmt_layer<W>(config: &LogConfig, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(config.thread_names);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().with_current_span(true).boxed(),
        LogFormat::Full => base.boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_compact_info_on_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.target, LogTarget::Stderr);
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn filter_accepts_directives() {
        let config = LogConfig::new("warn").with_directive("privfs_worker=debug");
        assert!(config.filter().is_ok());
    }

    #[test]
    fn filter_rejects_broken_directive() {
        let config = LogConfig::new("info").with_directive("[unclosed=debug");
        assert!(matches!(config.filter(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn toml_section_fills_missing_fields() {
        let config: LogConfig = toml::from_str(
            r#"
            level = "debug"
            format = "json"
            target = { file = "/var/log/privfs" }
            "#,
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.target, LogTarget::File(PathBuf::from("/var/log/privfs")));
        assert_eq!(config.file_prefix, "privfs-worker");
        assert!(config.directives.is_empty());
    }
}
