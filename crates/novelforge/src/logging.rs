//! Tracing subscriber setup.
//!
//! The crate logs through the `log` macros and opens `tracing` spans per
//! job. `tracing_log::LogTracer` forwards the former into the subscriber
//! so records carry the span context.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::NovelforgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Builds the filter from `RUST_LOG` when set, otherwise from `level`.
/// Chatty dependencies are capped at `warn`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, NovelforgeError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = format!("{},rusqlite=warn,tracing=warn", level);
    EnvFilter::try_new(&directives)
        .map_err(|e| NovelforgeError::Logging(format!("Invalid filter '{}': {}", directives, e)))
}

/// Installs the global subscriber. Fails when one is already installed.
pub fn init(level: &str, format: LogFormat) -> Result<(), NovelforgeError> {
    // Ignored when a logger is already set, e.g. by a test harness.
    tracing_log::LogTracer::init().ok();

    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_span_list(true)
            .with_filter(build_env_filter(level)?)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(build_env_filter(level)?)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| NovelforgeError::Logging(e.to_string()))?;

    tracing::debug!("Logging initialized: level={}, format={:?}", level, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("jsonl"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_env_filter("debug").is_ok());
        assert!(build_env_filter("novelforge=loud").is_err());
    }
}
