//! Tracing setup for the dashfeed generators.
//!
//! Both binaries are batch jobs that log to the operator console, so the
//! default is the compact formatter with level prefixes on stderr. Setting
//! `DASHFEED_LOG_FORMAT=json` switches to one JSON object per line for
//! schedulers that ship logs elsewhere.
//!
//! ```ignore
//! use dashfeed_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli(verbose))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log targets that follow the configured level.
///
/// Everything else (HTTP stack, TLS) stays at `warn` unless `RUST_LOG` says
/// otherwise.
const APP_TARGETS: &[&str] = &["dashfeed", "calendar_feed", "transit_feed"];

/// Variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "DASHFEED_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// `LEVEL message key=value` lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl TracingOutputFormat {
    /// Parses a format name; unknown names fall back to compact.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Logging configuration for one process.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for dashfeed targets when `RUST_LOG` is not set.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Adds file and line to each event.
    pub include_location: bool,
    /// Explicit filter directive; wins over `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Config for the command-line generators.
    ///
    /// `verbose` switches dashfeed targets to DEBUG and adds source
    /// locations. The format comes from [`LOG_FORMAT_ENV`].
    #[must_use]
    pub fn cli(verbose: bool) -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .map(|name| TracingOutputFormat::from_name(&name))
            .unwrap_or_default();

        let config = Self::default().with_format(format);
        if verbose {
            Self {
                default_level: Level::DEBUG,
                include_location: true,
                ..config
            }
        } else {
            config
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter used when neither `env_filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        let level = self.default_level.to_string().to_lowercase();
        APP_TARGETS.iter().fold(String::from("warn"), |mut directive, target| {
            directive.push_str(&format!(",{target}={level}"));
            directive
        })
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        Ok(match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter)?,
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.default_directive()))?,
        })
    }
}

/// Installs the global subscriber. Call once at process start.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(false);

    match config.output_format {
        TracingOutputFormat::Compact => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(layer.compact());
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(layer.json());
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_level_and_adds_location() {
        let verbose = TracingConfig::cli(true);
        assert_eq!(verbose.default_level, Level::DEBUG);
        assert!(verbose.include_location);

        let quiet = TracingConfig::cli(false);
        assert_eq!(quiet.default_level, Level::INFO);
        assert!(!quiet.include_location);
    }

    #[test]
    fn directive_covers_library_and_binaries() {
        let directive = TracingConfig::cli(true).default_directive();
        assert_eq!(
            directive,
            "warn,dashfeed=debug,calendar_feed=debug,transit_feed=debug"
        );
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn format_names() {
        assert_eq!(TracingOutputFormat::from_name("JSON"), TracingOutputFormat::Json);
        assert_eq!(TracingOutputFormat::from_name("compact"), TracingOutputFormat::Compact);
        assert_eq!(TracingOutputFormat::from_name("fancy"), TracingOutputFormat::Compact);
    }

    #[test]
    fn explicit_filter_must_parse() {
        let config = TracingConfig::default().with_env_filter("dashfeed=loud");
        assert!(config.filter().is_err());

        let config = TracingConfig::default()
            .with_format(TracingOutputFormat::Json)
            .with_env_filter("dashfeed_providers=trace");
        assert_eq!(config.output_format, TracingOutputFormat::Json);
        assert!(config.filter().is_ok());
    }
}
