//! Structured logging setup.
//!
//! The generator runs inside build scripts and CI jobs, so the defaults are
//! tuned for that: compact human output on stderr, JSON when `LOG_FORMAT=json`,
//! and an optional log file for hosts that swallow stderr.

use anyhow::{Context, Result};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVE: &str = "codec_registry_gen=info";

/// Configuration for logging setup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log format: "json" or "pretty"
    pub format: LogFormat,
    /// Log output: "stdout", "stderr", or "file"
    pub output: LogOutput,
    /// Directory for log files (when output is "file")
    pub log_dir: PathBuf,
    /// Log file name prefix
    pub log_file_prefix: String,
    /// Filter used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Emit ANSI colors (pretty format only)
    pub ansi: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            log_dir: PathBuf::from("logs"),
            log_file_prefix: "codec-registry-gen".to_string(),
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(format) = env::var("LOG_FORMAT") {
            config.format = parse_format(&format).unwrap_or(config.format);
        }

        if let Ok(output) = env::var("LOG_OUTPUT") {
            config.output = parse_output(&output).unwrap_or(config.output);
        }

        if let Ok(log_dir) = env::var("LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }

        // Cargo captures build script output; colors only add noise there.
        if env::var_os("NO_COLOR").is_some() || env::var_os("OUT_DIR").is_some() {
            config.ansi = false;
        }

        config
    }
}

fn parse_format(raw: &str) -> Option<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_output(raw: &str) -> Option<LogOutput> {
    match raw.to_ascii_lowercase().as_str() {
        "stdout" => Some(LogOutput::Stdout),
        "stderr" => Some(LogOutput::Stderr),
        "file" => Some(LogOutput::File),
        _ => None,
    }
}

/// Initialize structured logging with the given configuration.
///
/// Returns a WorkerGuard that must be held until the run finishes so buffered
/// lines are flushed.
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let (writer, guard) = match config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        LogOutput::File => {
            std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
            let file_appender =
                tracing_appender::rolling::never(&config.log_dir, &config.log_file_prefix);
            tracing_appender::non_blocking(file_appender)
        }
    };

    let registry = tracing_subscriber::registry();

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_level(true)
                .with_current_span(true)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("failed to install tracing subscriber")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_target(false)
                .with_level(true)
                .with_ansi(config.ansi && config.output != LogOutput::File)
                .with_filter(env_filter);
            registry
                .with(fmt_layer)
                .try_init()
                .context("failed to install tracing subscriber")?;
        }
    }

    tracing::debug!(
        format = ?config.format,
        output = ?config.output,
        "logging initialized"
    );

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_format_is_case_insensitive() {
        assert_eq!(parse_format("JSON"), Some(LogFormat::Json));
        assert_eq!(parse_format("pretty"), Some(LogFormat::Pretty));
        assert_eq!(parse_format("xml"), None);
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("file"), Some(LogOutput::File));
        assert_eq!(parse_output("Stdout"), Some(LogOutput::Stdout));
        assert_eq!(parse_output("syslog"), None);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_format_and_dir() {
        // SAFETY: serialized with the other env-mutating tests.
        unsafe {
            env::set_var("LOG_FORMAT", "json");
            env::set_var("LOG_DIR", "/tmp/codec-logs");
        }
        let config = LoggingConfig::from_env();
        unsafe {
            env::remove_var("LOG_FORMAT");
            env::remove_var("LOG_DIR");
        }

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/codec-logs"));
        assert_eq!(config.output, LogOutput::Stderr);
    }
}
