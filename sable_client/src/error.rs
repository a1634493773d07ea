use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc::error::{SendError, TrySendError};

/// An error in the supplied configuration. These are returned synchronously
/// and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Empty server address")]
    EmptyAddress,
    #[error("Wrong number of ':' in address {0}")]
    WrongSeparatorCount(String),
    #[error("Hostname is missing in address {0}")]
    MissingHost(String),
    #[error("Port is missing in address {0}")]
    MissingPort(String),
    #[error("Couldn't parse port in address {0}")]
    InvalidPort(String),
    #[error("Port number {0} outside valid range")]
    PortOutOfRange(i64),
    #[error("Empty nick")]
    EmptyNick,
    #[error("Empty user")]
    EmptyUser,
    #[error("Line break in {0}")]
    LineBreak(&'static str),
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
    #[error("No server configured")]
    NoServer,
    #[error("Log target has no destination")]
    MissingLogDestination,
    #[error("Couldn't open log destination {1}: {0}")]
    LogDestination(String, PathBuf),
    #[error("I/O error on {1}: {0}")]
    Io(std::io::Error, PathBuf),
    #[error("JSON parse error in {1}: {0}")]
    Json(serde_json::Error, PathBuf),
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// An error that might occur on a live connection, or when establishing one.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation timed out")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Send queue full")]
    SendQueueFull,
    #[error("Line break inside outbound command")]
    EmbeddedLineBreak,
    #[error("Not connected")]
    NotConnected,
    #[error("Another task is already running this connection")]
    AlreadyRunning,
    #[error("Disconnect called")]
    Disconnected,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConnectionError {
    /// Whether this is the condition raised by a caller-initiated disconnect,
    /// as opposed to a genuine transport failure.
    pub fn is_deliberate(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl From<tokio::time::error::Elapsed> for ConnectionError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl<T> From<SendError<T>> for ConnectionError {
    fn from(_: SendError<T>) -> Self {
        Self::NotConnected
    }
}

impl<T> From<TrySendError<T>> for ConnectionError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => Self::SendQueueFull,
            TrySendError::Closed(_) => Self::NotConnected,
        }
    }
}

/// An error produced when framing an inbound line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Malformed line: empty")]
    MalformedLine,
}
