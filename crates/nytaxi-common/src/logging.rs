//! Logging configuration and initialization
//!
//! Every binary in the workspace calls [`init_logging`] once at startup.
//! Supported:
//!
//! - console, daily-rolling file, or both
//! - text or JSON lines
//! - a base level plus extra `target=level` directives
//! - environment overrides (`LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`,
//!   `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER`)
//!
//! Use the `tracing` macros with structured fields rather than `println!`:
//!
//! ```rust,ignore
//! info!(month = %task.month, url = %task.url, "Downloading");
//! warn!(key = %key, attempt, error = %err, "Upload attempt failed");
//! ```

use anyhow::Context;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::{NytaxiError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    const CHOICES: &'static [(&'static str, LogOutput)] = &[
        ("console", LogOutput::Console),
        ("stdout", LogOutput::Console),
        ("file", LogOutput::File),
        ("both", LogOutput::Both),
    ];

    pub fn to_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    pub fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    const CHOICES: &'static [(&'static str, LogFormat)] =
        &[("text", LogFormat::Text), ("pretty", LogFormat::Text), ("json", LogFormat::Json)];
}

fn parse_choice<T: Copy>(var: &str, value: &str, choices: &[(&str, T)]) -> Result<T> {
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, choice)| *choice)
        .ok_or_else(|| NytaxiError::Config(format!("unknown {} '{}'", var, value)))
}

/// Set, non-blank environment variable
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Logging configuration, assembled with chained setters:
///
/// ```rust,ignore
/// let config = LogConfig::default()
///     .level(Level::DEBUG)
///     .file_prefix("nytaxi")
///     .with_env_overrides()?;
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Rolling files land here when output includes a file
    pub dir: PathBuf,
    /// e.g. "nytaxi" gives "nytaxi.2025-11-02"
    pub file_prefix: String,
    /// Extra directives such as "aws_config=warn"
    pub directives: Vec<String>,
    pub show_location: bool,
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            format: LogFormat::Text,
            dir: PathBuf::from("./logs"),
            file_prefix: "nytaxi".to_string(),
            directives: Vec::new(),
            show_location: false,
            show_target: true,
        }
    }
}

impl LogConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn show_location(mut self, show: bool) -> Self {
        self.show_location = show;
        self
    }

    /// Apply `LOG_*` variables on top of this configuration. Unset or blank
    /// variables leave the current value; `LOG_FILTER` adds directives.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(level) = env_value("LOG_LEVEL") {
            self.level = level
                .parse()
                .map_err(|_| NytaxiError::Config(format!("unknown LOG_LEVEL '{}'", level)))?;
        }
        if let Some(output) = env_value("LOG_OUTPUT") {
            self.output = parse_choice("LOG_OUTPUT", &output, LogOutput::CHOICES)?;
        }
        if let Some(format) = env_value("LOG_FORMAT") {
            self.format = parse_choice("LOG_FORMAT", &format, LogFormat::CHOICES)?;
        }
        if let Some(dir) = env_value("LOG_DIR") {
            self.dir = dir.into();
        }
        if let Some(prefix) = env_value("LOG_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        if let Some(filter) = env_value("LOG_FILTER") {
            self.directives.extend(
                filter
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from),
            );
        }
        Ok(self)
    }

    fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let base = EnvFilter::from_default_env()
            .add_directive(LevelFilter::from_level(self.level).into());

        self.directives.iter().try_fold(base, |filter, directive| -> anyhow::Result<EnvFilter> {
            let parsed: Directive = directive
                .parse()
                .with_context(|| format!("Invalid filter directive '{}'", directive))?;
            Ok(filter.add_directive(parsed))
        })
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(self.show_target)
            .with_file(self.show_location)
            .with_line_number(self.show_location)
            .with_span_events(FmtSpan::CLOSE);

        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
///
/// Hold it in `main` for the lifetime of the process.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. Call once per process.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<LogGuard> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.output.to_console() {
        layers.push(config.fmt_layer(std::io::stdout, true));
    }

    if config.output.to_file() {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("Failed to create log directory {}", config.dir.display()))?;

        let appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(config.fmt_layer(writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}
