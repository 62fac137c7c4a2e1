//! Fmtbridge Core
//!
//! The protocol between a host program and a source-code formatting engine:
//! how input crosses the boundary, who owns formatted output, and where the
//! output goes.
//!
//! # Quick Start
//!
//! ```
//! use fmtbridge_core::{Bridge, InitStatus, LayoutConfig, RawBuffer};
//!
//! let bridge = Bridge::builtin(LayoutConfig::default());
//! assert_eq!(bridge.initialize(), InitStatus::Ok);
//!
//! // Whole-buffer formatting hands an owned result back to the caller
//! let out = bridge.format_buffer(RawBuffer::from("x=1")).unwrap();
//! assert_eq!(out.as_bytes(), b"x=1\n");
//! ```
//!
//! # Streaming to a Destination
//!
//! ```no_run
//! use fmtbridge_core::{Bridge, LayoutConfig, RawBuffer};
//! use std::path::Path;
//!
//! let bridge = Bridge::builtin(LayoutConfig::default());
//! bridge.initialize();
//!
//! let tree = r#"{"type":"program","start":0,"end":3}"#;
//! bridge
//!     .format_to_file(Path::new("out.rb"), RawBuffer::from("x=1"), RawBuffer::from(tree))
//!     .unwrap();
//! ```

pub mod bridge;
pub mod buffer;
pub mod destination;
pub mod engine;
pub mod error;
pub mod input;
pub mod status;
pub mod token;

pub use bridge::Bridge;
pub use buffer::{RawBuffer, ResultBuffer};
pub use destination::{try_write_intermediary, write_intermediary, Destination, DestinationWriter};
pub use engine::{BuiltinEngine, DylibEngine, Engine, EngineHandle, EngineState, LayoutConfig};
pub use error::{BridgeError, FormatFailure};
pub use input::{read_all_input, InputBuffer};
pub use status::{ErrorCategory, InitStatus, RawStatus, StatusCode};
pub use token::{Token, TokenStream};
