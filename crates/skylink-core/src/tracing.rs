//! Subscriber setup for processes embedding skylink.
//!
//! The engines only emit events. Applications that have no subscriber of
//! their own can install one here:
//!
//! ```ignore
//! use skylink_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::worker())?;
//! ```

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    /// Single line, no timestamps.
    Compact,
    /// One object per line, for log shipping.
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the `skylink` targets when neither `directive` nor
    /// `RUST_LOG` is set.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Print source file and line.
    pub with_location: bool,
    pub directive: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            with_location: false,
            directive: None,
        }
    }
}

impl TracingConfig {
    /// Compact debug output for watching a single connection.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            with_location: true,
            directive: None,
        }
    }

    /// JSON output for long-running workers.
    #[must_use]
    pub fn worker() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            with_location: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Use `directive` instead of `RUST_LOG` and the default level.
    #[must_use]
    pub fn with_env_filter(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub fn default_directive(&self) -> String {
        format!("skylink={}", self.level)
    }

    /// The filter `init_tracing` installs.
    pub fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.directive {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    {
        let layer = fmt::layer()
            .with_file(self.with_location)
            .with_line_number(self.with_location);

        match self.format {
            TracingOutputFormat::Pretty => layer.pretty().boxed(),
            TracingOutputFormat::Compact => layer.compact().without_time().boxed(),
            TracingOutputFormat::Json => layer.json().with_current_span(false).boxed(),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the directive does not
/// parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let subscriber = tracing_subscriber::registry()
        .with(config.filter()?)
        .with(config.layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
