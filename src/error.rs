//! Error taxonomy
//!
//! `EngineError` is what the codec/container engine reports; `MediaError`
//! is what the demux, mux and decode components surface to callers, with
//! the engine error attached as the cause. End of stream and "try again"
//! are not errors and never appear here: pump operations report them
//! through [`crate::Flow`].

use thiserror::Error;

use crate::media::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The engine needs more input before it can produce output
    Again,
    /// Stream parameters could not be determined
    Probe,
    Other,
}

/// Failure reported by the underlying engine, rendered to text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn again(message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Again,
            message: message.into(),
        }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Probe,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    pub fn is_again(&self) -> bool {
        self.kind == EngineErrorKind::Again
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::WouldBlock {
            EngineError::again(err.to_string())
        } else {
            EngineError::new(err.to_string())
        }
    }
}

impl From<ac_ffmpeg::Error> for EngineError {
    fn from(err: ac_ffmpeg::Error) -> Self {
        EngineError::new(err.to_string())
    }
}

impl From<ac_ffmpeg::codec::CodecError> for EngineError {
    fn from(err: ac_ffmpeg::codec::CodecError) -> Self {
        if err.is_again() {
            EngineError::again(err.to_string())
        } else {
            EngineError::new(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unable to open {target}: {source}")]
    Open { target: String, source: EngineError },
    #[error("Unable to determine stream info: {0}")]
    Probe(#[source] EngineError),
    #[error("No {0} stream found")]
    StreamNotFound(MediaKind),
    #[error("Failed to copy {kind} stream parameters: {source}")]
    StreamCopy { kind: MediaKind, source: EngineError },
    #[error("Failed to write header: {0}")]
    HeaderWrite(#[source] EngineError),
    #[error("Failed to write trailer: {0}")]
    TrailerWrite(#[source] EngineError),
    #[error("I/O error: {0}")]
    Io(#[source] EngineError),
    #[error("Fatal decode error: {0}")]
    Fatal(#[source] EngineError),
    #[error("Timestamp of the {0} stream overflowed")]
    TimestampOverflow(MediaKind),
    #[error("Cannot {op} while {state}")]
    InvalidState { op: &'static str, state: &'static str },
}

impl MediaError {
    pub(crate) fn open(target: impl Into<String>, source: EngineError) -> Self {
        MediaError::Open {
            target: target.into(),
            source,
        }
    }

    pub(crate) fn invalid_state(op: &'static str, state: &'static str) -> Self {
        MediaError::InvalidState { op, state }
    }

    /// Transient engine conditions that a pump loop should simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            MediaError::Io(source) | MediaError::Fatal(source) => source.is_again(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
