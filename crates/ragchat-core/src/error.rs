//! Error types for the streaming core.
//!
//! Every failure is scoped to a single chat session; none of these errors is
//! fatal to the client.

use thiserror::Error;

/// A single `data:` line could not be turned into a frame.
///
/// Decode errors are logged and the offending line is skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line was not valid UTF-8.
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The payload was not a recognized JSON frame.
    #[error("invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// The transport carrying the event stream failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("server returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body or reason text, if any.
        message: String,
    },

    /// Reading the response body failed mid-stream.
    #[error("stream read failed: {0}")]
    Read(String),

    /// The stream was aborted by the user or a timeout.
    #[error("stream cancelled")]
    Cancelled,
}

/// A submission was rejected before any session was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// A session is already streaming.
    #[error("a response is still streaming")]
    Busy,

    /// The submitted text was empty or whitespace.
    #[error("message is empty")]
    Blank,
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file was not valid.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value was out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
