//! Byte buffers exchanged with the engine.
//!
//! [`RawBuffer`] is the flat `(pointer, length)` view the engine consumes.
//! [`ResultBuffer`] is the owned output handed back by the engine; dropping it
//! is the one and only release.

use crate::engine::dylib::ForeignResult;
use crate::error::BridgeError;
use std::fmt;
use std::marker::PhantomData;
use std::slice;
use std::str::{self, Utf8Error};

/// Borrowed, non-owning view of contiguous bytes with an explicit length.
///
/// The layout is `{ const uint8_t *bytes; int64_t length; }` so the same
/// struct is passed by value through the C ABI. The length is authoritative;
/// no terminator is ever assumed.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawBuffer<'a> {
    bytes: *const u8,
    length: i64,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> RawBuffer<'a> {
    /// View a byte slice.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes: bytes.as_ptr(),
            length: bytes.len() as i64,
            _marker: PhantomData,
        }
    }

    /// The absent buffer: null pointer, zero length.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            bytes: std::ptr::null(),
            length: 0,
            _marker: PhantomData,
        }
    }

    /// Build a view from parts received across the boundary.
    ///
    /// # Safety
    ///
    /// If `bytes` is non-null it must point to at least `length` readable
    /// bytes that stay valid and unmodified for `'a`.
    #[must_use]
    pub const unsafe fn from_raw_parts(bytes: *const u8, length: i64) -> Self {
        Self {
            bytes,
            length,
            _marker: PhantomData,
        }
    }

    /// True for the absent buffer (null pointer).
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.bytes.is_null()
    }

    /// Declared length, which may be invalid for buffers built from raw parts.
    #[must_use]
    pub fn raw_len(&self) -> i64 {
        self.length
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes
    }

    /// Validate and borrow the bytes.
    ///
    /// A null pointer with zero length is the empty slice. A null pointer with
    /// a non-zero length, or a negative length, is rejected.
    pub fn try_as_bytes(&self) -> Result<&'a [u8], BridgeError> {
        if self.length < 0 {
            return Err(BridgeError::InvalidArgument("negative buffer length"));
        }
        if self.bytes.is_null() {
            if self.length == 0 {
                return Ok(&[]);
            }
            return Err(BridgeError::InvalidArgument("null buffer with non-zero length"));
        }
        // Safety: non-null and non-negative; validity is the constructor's contract
        Ok(unsafe { slice::from_raw_parts(self.bytes, self.length as usize) })
    }

    /// Borrow the bytes, treating an invalid buffer as empty.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.try_as_bytes().unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_str(&self) -> Result<&'a str, Utf8Error> {
        str::from_utf8(self.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for RawBuffer<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<&'a str> for RawBuffer<'a> {
    fn from(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl<'a> From<&'a Vec<u8>> for RawBuffer<'a> {
    fn from(v: &'a Vec<u8>) -> Self {
        Self::new(v.as_slice())
    }
}

impl fmt::Debug for RawBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("bytes", &self.bytes)
            .field("length", &self.length)
            .finish()
    }
}

enum Backing {
    Owned(Box<[u8]>),
    Foreign(ForeignResult),
}

/// Formatted output returned by an engine.
///
/// Ownership moves to the caller at return time. Dropping the buffer
/// releases it exactly once, on every exit path, and the pointer from
/// [`ResultBuffer::as_ptr`] is invalid afterwards.
pub struct ResultBuffer {
    backing: Backing,
}

impl ResultBuffer {
    /// Wrap bytes allocated on this side of the boundary.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(bytes.into_boxed_slice()),
        }
    }

    pub(crate) fn from_foreign(result: ForeignResult) -> Self {
        Self {
            backing: Backing::Foreign(result),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(bytes) => bytes,
            Backing::Foreign(result) => result.as_bytes(),
        }
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.as_bytes().as_ptr()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the bytes live in a foreign engine's allocation.
    #[must_use]
    pub fn is_foreign(&self) -> bool {
        matches!(self.backing, Backing::Foreign(_))
    }

    /// Copy (foreign) or move (owned) the bytes out, releasing the handle.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        match self.backing {
            Backing::Owned(bytes) => bytes.into_vec(),
            Backing::Foreign(result) => result.as_bytes().to_vec(),
        }
    }
}

impl From<String> for ResultBuffer {
    fn from(s: String) -> Self {
        Self::from_vec(s.into_bytes())
    }
}

impl From<Vec<u8>> for ResultBuffer {
    fn from(v: Vec<u8>) -> Self {
        Self::from_vec(v)
    }
}

impl fmt::Debug for ResultBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBuffer")
            .field("len", &self.len())
            .field("foreign", &self.is_foreign())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_buffer_views_slice() {
        let data = b"x=1";
        let raw = RawBuffer::new(data);
        assert_eq!(raw.len(), 3);
        assert_eq!(raw.as_bytes(), b"x=1");
        assert_eq!(raw.to_str().unwrap(), "x=1");
        assert!(!raw.is_null());
    }

    #[test]
    fn test_raw_buffer_length_is_authoritative() {
        let data = b"abc\0def";
        let raw = RawBuffer::new(data);
        assert_eq!(raw.len(), 7);
        assert_eq!(raw.as_bytes(), data);
    }

    #[test]
    fn test_null_buffer_is_empty() {
        let raw = RawBuffer::null();
        assert!(raw.is_null());
        assert!(raw.is_empty());
        assert_eq!(raw.try_as_bytes().unwrap(), b"");
    }

    #[test]
    fn test_invalid_raw_parts_are_rejected() {
        let raw = unsafe { RawBuffer::from_raw_parts(std::ptr::null(), 4) };
        assert!(matches!(
            raw.try_as_bytes(),
            Err(BridgeError::InvalidArgument(_))
        ));

        let data = b"abc";
        let negative = unsafe { RawBuffer::from_raw_parts(data.as_ptr(), -1) };
        assert!(negative.try_as_bytes().is_err());
        assert!(negative.as_bytes().is_empty());
    }

    #[test]
    fn test_raw_buffer_layout_matches_c() {
        assert_eq!(
            std::mem::size_of::<RawBuffer<'_>>(),
            std::mem::size_of::<*const u8>() + std::mem::size_of::<i64>()
        );
    }

    #[test]
    fn test_result_buffer_owned() {
        let result = ResultBuffer::from("x = 1\n".to_string());
        assert_eq!(result.len(), 6);
        assert_eq!(result.as_bytes(), b"x = 1\n");
        assert!(!result.is_foreign());
        assert_eq!(result.into_vec(), b"x = 1\n".to_vec());
    }

    #[test]
    fn test_empty_result_buffer() {
        let result = ResultBuffer::from_vec(Vec::new());
        assert!(result.is_empty());
        assert_eq!(result.as_bytes(), b"");
    }
}
