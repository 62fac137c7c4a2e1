//! Error types for boundary operations.
//!
//! Every error maps to exactly one [`StatusCode`], which is what actually
//! crosses the boundary.

use crate::status::{RawStatus, StatusCode};
use std::io;

/// Failure reported by an engine while formatting.
///
/// A format failure never comes with partial output.
#[derive(Debug, thiserror::Error)]
pub enum FormatFailure {
    /// The engine rejected the input.
    #[error("syntax error: {message}")]
    Syntax { message: String },

    /// The pre-parsed tree could not be decoded or does not match the source.
    #[error("invalid syntax tree: {0}")]
    TreeDecode(String),

    /// The engine failed for another reason.
    #[error("engine error: {0}")]
    Engine(String),

    /// The engine does not implement this shape of formatting.
    #[error("engine does not support {0}")]
    Unsupported(&'static str),

    /// A foreign engine returned a status this side does not know.
    #[error("engine returned unknown status {code}")]
    Foreign { code: RawStatus },
}

impl FormatFailure {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Syntax { .. } => StatusCode::SyntaxError,
            Self::TreeDecode(_) => StatusCode::TreeDecodeFailure,
            Self::Engine(_) | Self::Unsupported(_) | Self::Foreign { .. } => {
                StatusCode::EngineError
            }
        }
    }

    /// Rebuild a failure from a status returned by a foreign engine.
    #[must_use]
    pub fn from_status(raw: RawStatus) -> Self {
        match StatusCode::from_raw(raw) {
            Some(StatusCode::SyntaxError) => Self::Syntax {
                message: "rejected by engine".to_string(),
            },
            Some(StatusCode::TreeDecodeFailure) => {
                Self::TreeDecode("rejected by engine".to_string())
            }
            Some(status) if !status.is_ok() => Self::Engine(status.description().to_string()),
            _ => Self::Foreign { code: raw },
        }
    }
}

/// Errors surfaced by top-level boundary operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The engine could not start.
    #[error("engine initialization failed: {0}")]
    Initialization(String),

    /// A format call was issued before the engine was initialized.
    #[error("engine used before initialization")]
    NotInitialized,

    /// The input could not be formatted.
    #[error(transparent)]
    Format(#[from] FormatFailure),

    /// The destination path is unusable (empty, not UTF-8).
    #[error("bad destination path: {0}")]
    BadFileName(String),

    /// The destination could not be opened.
    #[error("could not open {target}: {source}")]
    DestinationOpen {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Writing to (or finalizing) the destination failed.
    #[error("could not write {target}: {source}")]
    DestinationWrite {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Reading the input stream failed.
    #[error("could not read input: {0}")]
    Input(#[source] io::Error),

    /// A boundary argument was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl BridgeError {
    /// The status code that represents this error across the boundary.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Initialization(_) | Self::NotInitialized => StatusCode::InitializationFailure,
            Self::Format(failure) => failure.status(),
            Self::BadFileName(_) => StatusCode::BadFileName,
            Self::DestinationOpen { .. } => StatusCode::CouldntCreateFile,
            Self::DestinationWrite { .. } | Self::Input(_) => StatusCode::IoError,
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
        }
    }

    /// True when the output target, not the input, is at fault.
    #[must_use]
    pub fn is_destination_failure(&self) -> bool {
        matches!(
            self,
            Self::BadFileName(_) | Self::DestinationOpen { .. } | Self::DestinationWrite { .. }
        )
    }
}
