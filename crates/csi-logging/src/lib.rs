// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized logging utilities for the S3 CSI mounter components
//!
//! Every binary initializes its subscriber through this crate so that log lines
//! share one format and end up on stderr, next to the output relayed from the
//! supervised Mountpoint process in the container log stream.

use std::io;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Re-export clap for convenience when using CliLoggingArgs
pub use clap;

// Re-export Level for convenience
pub use tracing::Level;

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

/// CLI log level enum for clap integration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error conditions
    Error,
    /// Errors and warnings
    Warn,
    /// Errors, warnings, and informational messages
    #[default]
    Info,
    /// All above plus debug information
    Debug,
    /// All above plus detailed tracing
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

/// Standardized CLI logging arguments for clap integration
///
/// Use this with `#[command(flatten)]` so every binary exposes the same
/// `--log-level` and `--log-format` switches.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct CliLoggingArgs {
    /// Log verbosity level
    #[arg(long, value_enum, help = "Log verbosity level (default: info)")]
    pub log_level: Option<CliLogLevel>,

    /// Log output format
    #[arg(long, value_enum, help = "Log output format (default: plaintext)")]
    pub log_format: Option<LogFormat>,
}

impl CliLoggingArgs {
    /// Initialize logging to stderr based on the parsed CLI arguments
    ///
    /// # Examples
    /// ```rust
    /// use csi_logging::CliLoggingArgs;
    /// use clap::Parser;
    ///
    /// #[derive(Parser)]
    /// struct Args {
    ///     #[command(flatten)]
    ///     logging: CliLoggingArgs,
    /// }
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let args = Args::parse();
    ///     args.logging.init("my-binary")?;
    ///     Ok(())
    /// }
    /// ```
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        self.init_with_default_level(component, CliLogLevel::Info)
    }

    pub fn init_with_default_level(
        self,
        component: &str,
        default_level: CliLogLevel,
    ) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or(default_level).into();
        init(component, level, self.log_format.unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.log_level.is_none() && self.log_format.is_none()
    }
}

/// Initialize logging to stderr with the specified component name, default level, and format
///
/// # Example
/// ```rust
/// use csi_logging::{init, Level, LogFormat};
///
/// fn main() -> anyhow::Result<()> {
///     init("aws-s3-csi-mounter", Level::INFO, LogFormat::Plaintext)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

/// Initialize logging with a custom writer
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies both globally
/// and to the `component` target.
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},{}={}",
            default_level,
            component.replace('-', "_"),
            default_level
        ))
    });

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Redact sensitive information from log output
///
/// # Example
/// ```rust
/// use csi_logging::redact;
///
/// let secret = "wJalrXUtnFEMI/K7MDENG";
/// tracing::info!(secret = %redact(secret), "credentials configured");
/// // Output: secret="[REDACTED]"
/// ```
pub fn redact(_value: impl std::fmt::Display) -> &'static str {
    "[REDACTED]"
}

/// Redact the value half of a `KEY=VALUE` environment entry
///
/// Keys stay visible so operators can still tell which variables were passed.
///
/// ```rust
/// use csi_logging::redact_env_entry;
///
/// assert_eq!(redact_env_entry("AWS_SECRET_ACCESS_KEY=abc"), "AWS_SECRET_ACCESS_KEY=[REDACTED]");
/// assert_eq!(redact_env_entry("NO_VALUE"), "NO_VALUE");
/// ```
pub fn redact_env_entry(entry: &str) -> String {
    match entry.split_once('=') {
        Some((key, value)) => format!("{}={}", key, redact(value)),
        None => entry.to_string(),
    }
}
