//! Error types for the form tracker

use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking form state
#[derive(Error, Debug)]
pub enum Error {
    /// The durable store refused a write (quota exceeded, access denied, ...)
    #[error("Storage write failed: {0}")]
    Storage(String),

    /// The host bridge went away or answered with something unexpected
    #[error("Host bridge error: {0}")]
    Bridge(String),

    /// A message or document could not be decoded
    #[error("Failed to parse: {0}")]
    Parse(String),

    /// A selector could not be parsed
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Filesystem error from a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Raised when a selector string is not valid CSS for the supported grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

impl SelectorError {
    pub fn new(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
