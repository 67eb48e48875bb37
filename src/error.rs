//! Error types for the reply-decision engine.

use thiserror::Error;

/// Errors raised while loading or validating the rules configuration.
///
/// Any of these is fatal at startup: the engine refuses to serve a single
/// channel on a malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse rules file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A probability or modifier is outside its allowed bounds.
    #[error("value out of range for {field}: {value} (expected {expected})")]
    OutOfRange {
        field: String,
        value: f64,
        expected: &'static str,
    },

    /// A section references an agent id that has no vibe rules.
    #[error("unknown agent `{agent_id}` referenced by {section}")]
    UnknownAgent { agent_id: String, section: String },

    /// A keyword category or special trigger has an empty keyword list.
    #[error("empty keyword list for {name}")]
    EmptyKeywords { name: String },

    /// A required numeric field is not positive.
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: String, value: i64 },
}

/// Errors raised by the running engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The channel worker's queue is gone (channel torn down).
    #[error("channel `{channel_id}` is closed")]
    ChannelClosed { channel_id: String },

    /// The outbound directive sink was dropped by the consumer.
    #[error("directive sink closed")]
    SinkClosed,
}
