//! Integer status codes that cross the boundary.
//!
//! Neither side of the boundary can assume a shared unwinding mechanism, so
//! every failure travels as a plain integer. Hosts translate a non-zero code
//! into whatever error convention their runtime uses.

use std::fmt;

/// Raw status type used by every status-returning boundary call.
pub type RawStatus = i64;

/// Result of engine initialization (C `int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum InitStatus {
    Ok = 0,
    Error = 1,
}

impl InitStatus {
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Broad failure category a status code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The engine could not start. Fatal to the host.
    Initialization,
    /// The input could not be formatted.
    Format,
    /// The destination could not be opened or written.
    Destination,
    /// A boundary argument was malformed (null pointer, negative length).
    Argument,
    /// Check mode found input that would change.
    Check,
}

/// Status codes returned across the boundary.
///
/// `Ok` is zero; everything else names exactly one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum StatusCode {
    Ok = 0,
    InitializationFailure = 1,
    SyntaxError = 2,
    TreeDecodeFailure = 3,
    EngineError = 4,
    IoError = 5,
    BadFileName = 6,
    CouldntCreateFile = 7,
    InvalidArgument = 8,
    // Only produced by the driver's check mode
    DiffDetected = 9,
}

impl StatusCode {
    const ALL: [StatusCode; 10] = [
        Self::Ok,
        Self::InitializationFailure,
        Self::SyntaxError,
        Self::TreeDecodeFailure,
        Self::EngineError,
        Self::IoError,
        Self::BadFileName,
        Self::CouldntCreateFile,
        Self::InvalidArgument,
        Self::DiffDetected,
    ];

    /// Decode a raw status received from the other side of the boundary.
    #[must_use]
    pub fn from_raw(raw: RawStatus) -> Option<Self> {
        Self::ALL.into_iter().find(|s| *s as RawStatus == raw)
    }

    #[must_use]
    pub fn as_raw(self) -> RawStatus {
        self as RawStatus
    }

    /// Process exit code for this status.
    #[must_use]
    pub fn as_exit_code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// The failure category, or `None` for `Ok`.
    #[must_use]
    pub fn category(self) -> Option<ErrorCategory> {
        match self {
            Self::Ok => None,
            Self::InitializationFailure => Some(ErrorCategory::Initialization),
            Self::SyntaxError | Self::TreeDecodeFailure | Self::EngineError => {
                Some(ErrorCategory::Format)
            }
            Self::IoError | Self::BadFileName | Self::CouldntCreateFile => {
                Some(ErrorCategory::Destination)
            }
            Self::InvalidArgument => Some(ErrorCategory::Argument),
            Self::DiffDetected => Some(ErrorCategory::Check),
        }
    }

    /// Short human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InitializationFailure => "engine initialization failed",
            Self::SyntaxError => "input could not be parsed",
            Self::TreeDecodeFailure => "syntax tree could not be decoded",
            Self::EngineError => "engine failed to format input",
            Self::IoError => "destination could not be written",
            Self::BadFileName => "destination path is not valid",
            Self::CouldntCreateFile => "destination could not be opened",
            Self::InvalidArgument => "invalid boundary argument",
            Self::DiffDetected => "formatting would change input",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description(), self.as_raw())
    }
}
