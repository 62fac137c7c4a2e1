//! Top-level operations a host performs against one engine.

use crate::buffer::{RawBuffer, ResultBuffer};
use crate::destination::Destination;
use crate::engine::{BuiltinEngine, Engine, EngineHandle, EngineState, LayoutConfig};
use crate::error::BridgeError;
use crate::status::InitStatus;
use std::path::Path;

/// An engine plus the operations the boundary offers on it.
///
/// Every operation checks the initialization barrier first; the engine is
/// never reached when initialization failed or never happened.
#[derive(Debug)]
pub struct Bridge {
    handle: EngineHandle,
}

impl Bridge {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            handle: EngineHandle::new(engine),
        }
    }

    /// A bridge over the built-in engine.
    pub fn builtin(config: LayoutConfig) -> Self {
        Self::new(Box::new(BuiltinEngine::new(config)))
    }

    pub fn initialize(&self) -> InitStatus {
        self.handle.initialize()
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.handle.name()
    }

    /// Format a whole buffer and hand the result to the caller.
    pub fn format_buffer(&self, source: RawBuffer<'_>) -> Result<ResultBuffer, BridgeError> {
        let engine = self.handle.engine()?;
        let source = source.try_as_bytes()?;
        tracing::debug!(engine = engine.name(), len = source.len(), "formatting buffer");
        let result = engine.format(source)?;
        tracing::debug!(len = result.len(), "buffer formatted");
        Ok(result)
    }

    /// Format a pre-parsed tree and stream the output to `destination`.
    ///
    /// The tree is decoded and validated before the destination is opened, so
    /// a bad tree never creates or truncates a file. Returns bytes written.
    pub fn format_tree(
        &self,
        destination: &Destination,
        source: RawBuffer<'_>,
        tree: RawBuffer<'_>,
    ) -> Result<u64, BridgeError> {
        let engine = self.handle.engine()?;
        let source = source.try_as_bytes()?;
        let tree = tree.try_as_bytes()?;
        tracing::debug!(
            engine = engine.name(),
            len = source.len(),
            target_name = %destination.describe(),
            "formatting tree"
        );

        let tokens = engine.render(source, tree)?;
        let mut writer = destination.open()?;
        writer.write_tokens(tokens)?;
        writer.finish()
    }

    pub fn format_to_stdout(
        &self,
        source: RawBuffer<'_>,
        tree: RawBuffer<'_>,
    ) -> Result<u64, BridgeError> {
        self.format_tree(&Destination::Stdout, source, tree)
    }

    pub fn format_to_file(
        &self,
        path: &Path,
        source: RawBuffer<'_>,
        tree: RawBuffer<'_>,
    ) -> Result<u64, BridgeError> {
        self.format_tree(&Destination::File(path.to_path_buf()), source, tree)
    }
}
