//! Logging configuration and initialization
//!
//! All streamtally binaries log through `tracing`. [`init_logging`] installs
//! the global subscriber described by a [`LogConfig`]: console, a daily
//! rolling file, or both, as text or JSON lines.
//!
//! The HTTP and AWS stacks are chatty at `info`, so their targets are capped
//! at `warn` unless a `LOG_FILTER` directive says otherwise.
//!
//! ```rust
//! use tracing::warn;
//!
//! let channel_id = "UC123";
//! warn!(channel_id = %channel_id, "No live videos found");
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Dependency targets capped below the configured level.
pub const QUIET_DIRECTIVES: &[&str] = &[
    "aws_smithy_runtime=warn",
    "aws_smithy_runtime_api=warn",
    "aws_sdk_s3=warn",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "rustls=warn",
    "reqwest=warn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            other => return Err(anyhow!("unknown log level '{}'", other)),
        })
    }
}

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn to_console(self) -> bool {
        self != Self::File
    }

    fn to_file(self) -> bool {
        self != Self::Console
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "console" | "stdout" => Self::Console,
            "file" => Self::File,
            "both" => Self::Both,
            other => return Err(anyhow!("unknown log output '{}'", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "json" => Self::Json,
            other => return Err(anyhow!("unknown log format '{}'", other)),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,

    /// Directory for rolling files when output includes `file`
    pub log_dir: PathBuf,

    /// File name prefix; the appender adds the date
    pub log_file_prefix: String,

    /// Comma-separated directives applied after [`QUIET_DIRECTIVES`]
    pub filter_directives: Option<String>,

    /// Emit source file and line
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "streamtally".to_string(),
            filter_directives: None,
            include_location: false,
        }
    }
}

/// Non-empty value of an environment variable
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl LogConfig {
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`,
    /// `LOG_FILE_PREFIX`, `LOG_FILTER` and `LOG_INCLUDE_LOCATION`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(level) = env_value("LOG_LEVEL") {
            self.level = level.parse().context("LOG_LEVEL")?;
        }
        if let Some(output) = env_value("LOG_OUTPUT") {
            self.output = output.parse().context("LOG_OUTPUT")?;
        }
        if let Some(format) = env_value("LOG_FORMAT") {
            self.format = format.parse().context("LOG_FORMAT")?;
        }
        if let Some(dir) = env_value("LOG_DIR") {
            self.log_dir = dir.into();
        }
        if let Some(prefix) = env_value("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = env_value("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }
        if let Some(flag) = env_value("LOG_INCLUDE_LOCATION") {
            self.include_location = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_file_prefix = prefix.into();
        self
    }

    /// `RUST_LOG`, then the configured level, then quiet and user directives
    fn env_filter(&self) -> Result<EnvFilter> {
        let user = self
            .filter_directives
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty());

        QUIET_DIRECTIVES
            .iter()
            .copied()
            .chain(user)
            .try_fold(
                EnvFilter::from_default_env().add_directive(LevelFilter::from(self.level).into()),
                |filter, directive| -> Result<EnvFilter> {
                    let parsed = directive
                        .parse::<Directive>()
                        .with_context(|| format!("invalid filter directive '{}'", directive))?;
                    Ok(filter.add_directive(parsed))
                },
            )
    }
}

/// Flushes the file writer on drop; hold it for the life of the process.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

fn fmt_layer<S, W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(ansi);

    match config.format {
        LogFormat::Text => layer.compact().boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer<_>> = Vec::new();
    let mut file_guard = None;

    if config.output.to_console() {
        layers.push(fmt_layer(config, std::io::stdout, true));
    }

    if config.output.to_file() {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("cannot create log directory {}", config.log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config, writer, false));
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(LoggingGuard { _file: file_guard })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_output_targets() {
        let both: LogOutput = "both".parse().unwrap();
        assert!(both.to_console() && both.to_file());
        let file: LogOutput = "file".parse().unwrap();
        assert!(!file.to_console() && file.to_file());
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_builder_style_setters() {
        let config = LogConfig::default()
            .level(LogLevel::Debug)
            .log_file_prefix("sweep");
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.log_file_prefix, "sweep");
        assert_eq!(config.output, LogOutput::Console);
    }

    #[test]
    fn test_filter_directives() {
        let mut config = LogConfig::default();
        assert!(config.env_filter().is_ok());

        config.filter_directives = Some("hyper=info, aws_smithy_runtime=debug,".to_string());
        assert!(config.env_filter().is_ok());

        config.filter_directives = Some("hyper=notalevel".to_string());
        let err = config.env_filter().unwrap_err();
        assert!(err.to_string().contains("hyper=notalevel"));
    }

    // The only test in this crate that installs the global subscriber
    #[test]
    fn test_file_output_writes_to_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            output: LogOutput::File,
            log_dir: dir.path().join("logs"),
            log_file_prefix: "sweep-test".to_string(),
            ..LogConfig::default()
        };

        let guard = init_logging(&config).unwrap();
        tracing::info!(channel_id = "UC1", "file sink ready");
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sweep-test"));

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("file sink ready"));
        assert!(contents.contains("UC1"));

        assert!(init_logging(&config).is_err());
    }
}
