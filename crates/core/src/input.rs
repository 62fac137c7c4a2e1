//! Growable input reader.
//!
//! Accumulates a stream of unknown length into one contiguous buffer. The
//! buffer starts at [`INITIAL_CAPACITY`] bytes and doubles every time a chunk
//! fills the free space completely, so the number of reallocations grows
//! with the logarithm of the input size.

use crate::buffer::RawBuffer;
use std::io::{self, Read};

/// Initial buffer size in bytes.
pub const INITIAL_CAPACITY: usize = 1024;

/// Everything read from an input stream.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    growths: usize,
}

impl InputBuffer {
    /// Borrow the input as the flat view the engine consumes.
    #[must_use]
    pub fn as_raw(&self) -> RawBuffer<'_> {
        RawBuffer::new(&self.bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Capacity the reader had grown to when the stream ended.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the capacity was doubled.
    #[must_use]
    pub fn growths(&self) -> usize {
        self.growths
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

/// Read a stream to the end with the default initial capacity.
pub fn read_all_input<R: Read>(reader: R) -> io::Result<InputBuffer> {
    read_all_with_capacity(reader, INITIAL_CAPACITY)
}

/// Read a stream to the end, starting from `initial_capacity` bytes.
pub fn read_all_with_capacity<R: Read>(
    mut reader: R,
    initial_capacity: usize,
) -> io::Result<InputBuffer> {
    let mut buf = vec![0u8; initial_capacity.max(1)];
    let mut filled = 0;
    let mut growths = 0;

    loop {
        let chunk_end = buf.len();
        filled += fill_chunk(&mut reader, &mut buf[filled..chunk_end])?;

        // A short chunk means the stream is exhausted
        if filled < chunk_end {
            break;
        }

        let capacity = buf.len() * 2;
        tracing::trace!(filled, capacity, "input chunk full, doubling buffer");
        buf.resize(capacity, 0);
        growths += 1;
    }

    let capacity = buf.len();
    buf.truncate(filled);
    tracing::debug!(bytes = filled, growths, "read input");

    Ok(InputBuffer {
        bytes: buf,
        capacity,
        growths,
    })
}

/// Fill `chunk` the way `fread` does: keep reading until it is full or the
/// stream returns zero bytes. Returns the number of bytes read.
fn fill_chunk<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < chunk.len() {
        match reader.read(&mut chunk[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
