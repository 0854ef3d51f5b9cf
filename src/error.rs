//! Typed error kinds for the stages whose failures callers need to tell apart.
//! Stage plumbing wraps these in `anyhow::Error` with file/corpus context.

use thiserror::Error;

/// Input tables that do not carry the columns a stage needs. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{table}: record {index} is missing required field `{field}`")]
    MissingField {
        table: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("{table}: record {index} field `{field}` must be a string")]
    NotAString {
        table: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("{table}: record {index} is not a JSON object")]
    NotAnObject { table: &'static str, index: usize },
}

/// Timestamps that cannot be turned into UTC epoch seconds. Always fatal:
/// edge times and ordering depend on them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("{context}: timestamp {value} is not UTC (offset {offset})")]
    NotUtc {
        context: String,
        value: String,
        offset: String,
    },
    #[error("{context}: epoch {epoch} is outside the representable range")]
    OutOfRange { context: String, epoch: i64 },
    #[error("{context}: cannot read timestamp from `{value}`")]
    Unreadable { context: String, value: String },
}

/// A single record that an annotator could not process. Never fatal for the stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("empty text")]
    EmptyText,
    #[error("model call failed: {0}")]
    Model(String),
    #[error("model output does not match its label set: {0}")]
    Labels(String),
}

/// Configuration that parsed but does not describe a runnable pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}
