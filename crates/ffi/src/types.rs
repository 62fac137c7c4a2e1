//! FFI-safe types for UniFFI export.
//!
//! These mirror the core error and state types in a shape UniFFI can carry:
//! plain enums and string messages with the numeric status attached.

use fmtbridge_core::{BridgeError, EngineState, ErrorCategory};

#[derive(uniffi::Enum, Debug, Clone, PartialEq, Eq)]
pub enum FfiEngineState {
    Uninitialized,
    Ready,
    Failed { message: String },
}

impl From<EngineState> for FfiEngineState {
    fn from(s: EngineState) -> Self {
        match s {
            EngineState::Uninitialized => Self::Uninitialized,
            EngineState::Ready => Self::Ready,
            EngineState::Failed(message) => Self::Failed { message },
        }
    }
}

/// Errors surfaced to host-language bindings.
///
/// `code` is the same numeric status the C ABI returns.
#[derive(uniffi::Error, thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiBridgeError {
    #[error("{message}")]
    Initialization { code: i64, message: String },
    #[error("{message}")]
    Format { code: i64, message: String },
    #[error("{message}")]
    Destination { code: i64, message: String },
    #[error("{message}")]
    InvalidArgument { code: i64, message: String },
}

impl FfiBridgeError {
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::Initialization { code, .. }
            | Self::Format { code, .. }
            | Self::Destination { code, .. }
            | Self::InvalidArgument { code, .. } => *code,
        }
    }
}

impl From<BridgeError> for FfiBridgeError {
    fn from(e: BridgeError) -> Self {
        let status = e.status();
        let code = status.as_raw();
        let message = e.to_string();
        match status.category() {
            Some(ErrorCategory::Initialization) => Self::Initialization { code, message },
            Some(ErrorCategory::Destination) => Self::Destination { code, message },
            Some(ErrorCategory::Argument) => Self::InvalidArgument { code, message },
            Some(ErrorCategory::Format | ErrorCategory::Check) | None => {
                Self::Format { code, message }
            }
        }
    }
}
