//! Formatting engines and their process-wide lifecycle.
//!
//! The engine owns the grammar and the layout algorithm; this crate only
//! talks to it through [`Engine`]. [`EngineHandle`] is the one-time
//! initialization barrier every format call must pass.

pub mod builtin;
pub mod dylib;
pub mod tree;

use crate::buffer::ResultBuffer;
use crate::error::{BridgeError, FormatFailure};
use crate::status::InitStatus;
use crate::token::TokenStream;
use std::sync::OnceLock;

pub use builtin::{BuiltinEngine, LayoutConfig};
pub use dylib::DylibEngine;

/// A formatting engine.
///
/// Implementations are called synchronously; a call blocks until formatting
/// completes. Failures are returned, never partially written.
pub trait Engine: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> &str;

    /// One-time startup. Called at most once, before any format call.
    fn initialize(&self) -> Result<(), BridgeError>;

    /// Parse and format a whole buffer, returning owned output.
    fn format(&self, source: &[u8]) -> Result<ResultBuffer, FormatFailure>;

    /// Format a pre-parsed tree against its original source.
    ///
    /// All validation happens before the stream is returned; the stream
    /// itself cannot fail.
    fn render<'s>(&self, _source: &'s [u8], _tree: &[u8]) -> Result<TokenStream<'s>, FormatFailure> {
        Err(FormatFailure::Unsupported("tree formatting"))
    }
}

/// Lifecycle state of an [`EngineHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Failed(String),
}

/// Owns an engine and its initialization barrier.
pub struct EngineHandle {
    engine: Box<dyn Engine>,
    state: OnceLock<Result<(), String>>,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            state: OnceLock::new(),
        }
    }

    /// Initialize the engine. Only the first call reaches the engine; later
    /// calls report the recorded outcome.
    pub fn initialize(&self) -> InitStatus {
        let outcome = self.state.get_or_init(|| {
            tracing::debug!(engine = self.engine.name(), "initializing engine");
            match self.engine.initialize() {
                Ok(()) => {
                    tracing::debug!(engine = self.engine.name(), "engine ready");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(engine = self.engine.name(), error = %e, "engine failed to start");
                    Err(e.to_string())
                }
            }
        });

        match outcome {
            Ok(()) => InitStatus::Ok,
            Err(_) => InitStatus::Error,
        }
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        match self.state.get() {
            None => EngineState::Uninitialized,
            Some(Ok(())) => EngineState::Ready,
            Some(Err(msg)) => EngineState::Failed(msg.clone()),
        }
    }

    /// The engine, if and only if initialization succeeded.
    pub fn engine(&self) -> Result<&dyn Engine, BridgeError> {
        match self.state.get() {
            Some(Ok(())) => Ok(self.engine.as_ref()),
            Some(Err(msg)) => Err(BridgeError::Initialization(msg.clone())),
            None => Err(BridgeError::NotInitialized),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.engine.name()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        fail_init: bool,
        inits: Arc<AtomicUsize>,
    }

    impl Engine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn initialize(&self) -> Result<(), BridgeError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(BridgeError::Initialization("stub".into()))
            } else {
                Ok(())
            }
        }

        fn format(&self, source: &[u8]) -> Result<ResultBuffer, FormatFailure> {
            Ok(ResultBuffer::from_vec(source.to_vec()))
        }
    }

    fn handle(fail_init: bool) -> (EngineHandle, Arc<AtomicUsize>) {
        let inits = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine {
            fail_init,
            inits: Arc::clone(&inits),
        };
        (EngineHandle::new(Box::new(engine)), inits)
    }

    #[test]
    fn test_uninitialized_engine_is_unavailable() {
        let (handle, _) = handle(false);
        assert_eq!(handle.state(), EngineState::Uninitialized);
        assert!(matches!(handle.engine(), Err(BridgeError::NotInitialized)));
    }

    #[test]
    fn test_initialize_runs_once() {
        let (handle, inits) = handle(false);
        assert_eq!(handle.initialize(), InitStatus::Ok);
        assert_eq!(handle.initialize(), InitStatus::Ok);
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), EngineState::Ready);
        assert!(handle.engine().is_ok());
    }

    #[test]
    fn test_failed_initialization_is_sticky() {
        let (handle, inits) = handle(true);
        assert_eq!(handle.initialize(), InitStatus::Error);
        assert_eq!(handle.initialize(), InitStatus::Error);
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(matches!(handle.state(), EngineState::Failed(_)));
        assert!(matches!(
            handle.engine(),
            Err(BridgeError::Initialization(_))
        ));
    }

    #[test]
    fn test_default_render_is_unsupported() {
        let (handle, _) = handle(false);
        handle.initialize();
        let engine = handle.engine().unwrap();
        assert!(matches!(
            engine.render(b"x", b"{}"),
            Err(FormatFailure::Unsupported(_))
        ));
    }

    #[test]
    fn test_concurrent_initialization_has_one_winner() {
        let (handle, inits) = handle(false);
        let handle = Arc::new(handle);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.initialize())
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), InitStatus::Ok);
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }
}
