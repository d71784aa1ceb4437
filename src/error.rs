//! Typed error taxonomy for configuration, runner construction, transport,
//! and fatal control-loop conditions.
//!
//! Library code returns these; only the binary's `main` reaches for
//! `anyhow` to glue them together with I/O errors at the process boundary.

use thiserror::Error;

/// Errors raised while loading or reloading a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{field} out of range: {value} (expected {lo}..={hi})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        lo: i64,
        hi: i64,
    },
    #[error("{section}.{key} is not a valid value: {text:?}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        text: String,
    },
    #[error("min_bitrate ({min}) must not exceed max_bitrate ({max})")]
    MinExceedsMax { min: u64, max: u64 },
    #[error("legacy bitrate file must have exactly two lines, got {0}")]
    LegacyLineCount(usize),
    #[error("legacy bitrate file line {line} is not a valid integer: {text:?}")]
    LegacyParse { line: usize, text: String },
}

/// Errors raised by [`crate::runner::Runner`] construction.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown balancer algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("algorithm initialization failed: {0}")]
    InitFailure(String),
}

/// Categorized transport connect-time failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect timed out")]
    Timeout,
    #[error("stream id already in use")]
    StreamIdConflict,
    #[error("stream id rejected by peer")]
    StreamIdForbidden,
    #[error("failed to resolve address")]
    AddressResolution,
    #[error("failed to create socket")]
    SocketCreate,
    #[error("failed to set a socket option")]
    OptionSet,
    #[error("{0}")]
    Other(String),
}

/// Fatal conditions that terminate the control loop.
#[derive(Debug, Error)]
pub enum LoopFatal {
    #[error("pipeline made no progress for 1s")]
    PipelineStall,
    #[error("no acknowledgement observed for 6s")]
    AckTimeout,
    #[error("transport send failed: {0}")]
    SendFailure(String),
    #[error("balancer reinitialization failed: {0}")]
    InitFailure(#[from] RunnerError),
}
