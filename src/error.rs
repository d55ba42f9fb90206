use std::error::Error as StdError;

use thiserror::Error;

/// This crate's result type.
pub type Result<T> = std::result::Result<T, Error>;

/// This crate's error type.
///
/// Intentionally decoupled from `anyhow` so the orchestration core doesn't force `anyhow` onto
/// downstream consumers. The audio decoder's typed failure kinds (§4.1) live here as distinct
/// variants so protocol surfaces can map them to precise responses instead of one catch-all.
#[derive(Debug, Error)]
pub enum Error {
    /// The container could not be parsed at all (missing/garbled RIFF structure, no `data`
    /// chunk, `fmt` found after `data`, etc).
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// A recognized-but-unsupported encoding (non-PCM format tag, unexpected channel layout).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// `fmt` declared a bits-per-sample other than 16.
    #[error("unsupported bit depth: {0} bits per sample")]
    UnsupportedBitDepth(u16),

    /// A chunk declared more bytes than remained in the payload.
    #[error("truncated payload: {0}")]
    Truncated(String),

    /// The model context has not finished loading (or failed to load).
    #[error("model not ready")]
    ModelNotReady,

    /// The caller disconnected before the model call started (§7 "Client disconnect"). Never
    /// raised once inference has begun; no partial results are ever flushed.
    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Other(Box::new(err))
    }
}
