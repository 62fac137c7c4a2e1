//! Foreign bindings for Fmtbridge.
//!
//! Two surfaces over one process-wide engine:
//!
//! - a plain C ABI (`fmtbridge_*` symbols, see `include/fmtbridge.h`) for hosts
//!   that hand over raw buffers and own nothing but their inputs;
//! - UniFFI bindings for Swift, Kotlin, Python, and other languages.

mod boundary;
mod types;

pub use boundary::*;
pub use types::*;

use fmtbridge_core::{Bridge, InitStatus, LayoutConfig, RawBuffer, StatusCode};
use std::path::Path;
use std::sync::OnceLock;

uniffi::setup_scaffolding!();

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(|| Bridge::builtin(LayoutConfig::default()))
}

// =============================================================================
// Exported Functions
// =============================================================================

/// Get the library version string.
#[uniffi::export]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize the engine. Safe to call repeatedly.
#[uniffi::export]
pub fn initialize() -> Result<(), FfiBridgeError> {
    match bridge().initialize() {
        InitStatus::Ok => Ok(()),
        InitStatus::Error => Err(FfiBridgeError::Initialization {
            code: StatusCode::InitializationFailure.as_raw(),
            message: match engine_state() {
                FfiEngineState::Failed { message } => message,
                _ => "engine initialization failed".to_string(),
            },
        }),
    }
}

#[uniffi::export]
pub fn engine_state() -> FfiEngineState {
    bridge().state().into()
}

/// Format a whole source text.
#[uniffi::export]
pub fn format_source(source: String) -> Result<String, FfiBridgeError> {
    let result = bridge().format_buffer(RawBuffer::from(source.as_str()))?;
    String::from_utf8(result.into_vec()).map_err(|e| FfiBridgeError::Format {
        code: StatusCode::EngineError.as_raw(),
        message: format!("engine produced invalid UTF-8: {e}"),
    })
}

/// Format a pre-parsed tree (JSON) and write the output to standard output.
///
/// Returns the number of bytes written.
#[uniffi::export]
pub fn format_tree_to_stdout(source: String, tree: String) -> Result<u64, FfiBridgeError> {
    let bytes = bridge().format_to_stdout(
        RawBuffer::from(source.as_str()),
        RawBuffer::from(tree.as_str()),
    )?;
    Ok(bytes)
}

/// Format a pre-parsed tree (JSON) and write the output to `path`.
///
/// Returns the number of bytes written.
#[uniffi::export]
pub fn format_tree_to_file(
    path: String,
    source: String,
    tree: String,
) -> Result<u64, FfiBridgeError> {
    let bytes = bridge().format_to_file(
        Path::new(&path),
        RawBuffer::from(source.as_str()),
        RawBuffer::from(tree.as_str()),
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_version() {
        let v = version();
        assert!(v.starts_with("0."));
    }

    #[test]
    #[serial]
    fn test_format_source() {
        initialize().unwrap();
        assert_eq!(engine_state(), FfiEngineState::Ready);
        assert_eq!(format_source("x=1".to_string()).unwrap(), "x=1\n");
    }

    #[test]
    #[serial]
    fn test_format_tree_to_file() {
        initialize().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rb");
        let bytes = format_tree_to_file(
            path.to_string_lossy().into_owned(),
            "a  b".to_string(),
            r#"{"type":"p","start":0,"end":4,"children":[
                {"type":"i","start":0,"end":1},
                {"type":"i","start":3,"end":4}
            ]}"#
            .to_string(),
        )
        .unwrap();
        assert_eq!(bytes, 4);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a b\n");
    }

    #[test]
    #[serial]
    fn test_bad_tree_is_format_error() {
        initialize().unwrap();
        let err = format_tree_to_stdout("x".to_string(), "not json".to_string()).unwrap_err();
        assert!(matches!(err, FfiBridgeError::Format { code: 3, .. }));
    }
}
