//! Structured logging configuration.
//!
//! Log entries are written through `tracing-subscriber`, either as JSON
//! objects (one per line) or as pretty text for development:
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"WARN","target":"rscrm_domain::oracle","fields":{"message":"ownership check failed, denying"}}
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// JSON output, for production.
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    /// Text output, for development.
    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Include span enter/exit events in the output.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    /// Builds the logging configuration from the `logging` config section.
    ///
    /// The level has already been validated by [`crate::ServerConfig::validate`];
    /// an unparseable level falls back to INFO.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let base = if settings.json {
            Self::json()
        } else {
            Self::text()
        };
        let level = Level::from_str(&settings.level).unwrap_or(Level::INFO);
        base.with_level(level)
    }
}

/// Installs the global subscriber.
///
/// Call once at startup. Later calls are no-ops because the subscriber is global.
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = || {
        if config.include_spans {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    };

    // Exactly one of the two layers is present.
    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .with_span_events(span_events())
            .with_current_span(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
    });
    let text_layer = (!config.json_format).then(|| {
        fmt::layer()
            .pretty()
            .with_span_events(span_events())
            .with_target(true)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Creates a JSON subscriber writing to `writer`, so tests can capture and
/// inspect log output.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
