//! Engines loaded from a shared library.
//!
//! The library must export the same C ABI `fmtbridge-ffi` exports, under a
//! configurable symbol prefix:
//!
//! ```c
//! int      <prefix>_init(void);
//! void    *<prefix>_format_buffer(const uint8_t *ptr, int64_t len, int64_t *status);
//! const uint8_t *<prefix>_result_ptr(const void *result);
//! int64_t  <prefix>_result_len(const void *result);
//! void     <prefix>_result_free(void *result);
//! ```

use super::Engine;
use crate::buffer::ResultBuffer;
use crate::error::{BridgeError, FormatFailure};
use crate::status::StatusCode;
use libloading::Library;
use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

/// Symbol prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "fmtbridge";

type InitFn = unsafe extern "C" fn() -> c_int;
type FormatFn = unsafe extern "C" fn(*const u8, i64, *mut i64) -> *mut c_void;
type ResultPtrFn = unsafe extern "C" fn(*const c_void) -> *const u8;
type ResultLenFn = unsafe extern "C" fn(*const c_void) -> i64;
type ResultFreeFn = unsafe extern "C" fn(*mut c_void);

/// Resolved entry points of a foreign engine.
pub(crate) struct ForeignApi {
    init: InitFn,
    format_buffer: FormatFn,
    result_ptr: ResultPtrFn,
    result_len: ResultLenFn,
    result_free: ResultFreeFn,
    // Keeps the symbols above valid
    _library: Option<Library>,
}

impl ForeignApi {
    fn load(path: &Path, prefix: &str) -> Result<Self, String> {
        // SAFETY: loading runs the library's initializers; the caller chose
        // to trust this library by passing its path.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("cannot load {}: {e}", path.display()))?;

        let init = symbol::<InitFn>(&library, prefix, "init")?;
        let format_buffer = symbol::<FormatFn>(&library, prefix, "format_buffer")?;
        let result_ptr = symbol::<ResultPtrFn>(&library, prefix, "result_ptr")?;
        let result_len = symbol::<ResultLenFn>(&library, prefix, "result_len")?;
        let result_free = symbol::<ResultFreeFn>(&library, prefix, "result_free")?;

        Ok(Self {
            init,
            format_buffer,
            result_ptr,
            result_len,
            result_free,
            _library: Some(library),
        })
    }
}

fn symbol<T: Copy>(library: &Library, prefix: &str, name: &str) -> Result<T, String> {
    let full = format!("{prefix}_{name}");
    let mut cname = full.clone().into_bytes();
    cname.push(0);
    // SAFETY: every `T` used here matches the documented signature of the
    // symbol it is resolved for.
    unsafe { library.get::<T>(&cname) }
        .map(|s| *s)
        .map_err(|e| format!("missing symbol `{full}`: {e}"))
}

/// A result buffer still owned by the foreign engine.
///
/// Dropping it hands the buffer back to the engine exactly once.
pub struct ForeignResult {
    handle: NonNull<c_void>,
    bytes: *const u8,
    len: usize,
    api: Arc<ForeignApi>,
}

// The foreign side hands out immutable buffers that may be freed from any thread.
unsafe impl Send for ForeignResult {}
unsafe impl Sync for ForeignResult {}

impl ForeignResult {
    fn new(handle: NonNull<c_void>, api: Arc<ForeignApi>) -> Self {
        // SAFETY: `handle` came from this api's format call and is not freed yet.
        let (bytes, len) = unsafe {
            let bytes = (api.result_ptr)(handle.as_ptr());
            let len = (api.result_len)(handle.as_ptr());
            (bytes, usize::try_from(len).unwrap_or(0))
        };
        Self {
            handle,
            bytes,
            len,
            api,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.bytes.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: the engine keeps these bytes alive until `result_free`.
        unsafe { std::slice::from_raw_parts(self.bytes, self.len) }
    }
}

impl Drop for ForeignResult {
    fn drop(&mut self) {
        tracing::trace!(len = self.len, "releasing foreign result");
        // SAFETY: the handle is freed here and nowhere else.
        unsafe { (self.api.result_free)(self.handle.as_ptr()) }
    }
}

impl std::fmt::Debug for ForeignResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignResult")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .finish()
    }
}

/// Engine living in a shared library.
///
/// Loading is deferred to [`Engine::initialize`] so that a missing library
/// surfaces as an initialization failure.
pub struct DylibEngine {
    path: PathBuf,
    prefix: String,
    api: OnceLock<Arc<ForeignApi>>,
}

impl DylibEngine {
    pub fn open(path: impl Into<PathBuf>, prefix: Option<&str>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.unwrap_or(DEFAULT_PREFIX).to_string(),
            api: OnceLock::new(),
        }
    }

    #[cfg(test)]
    fn from_api(api: ForeignApi) -> Self {
        let engine = Self {
            path: PathBuf::from("<in-process>"),
            prefix: DEFAULT_PREFIX.to_string(),
            api: OnceLock::new(),
        };
        let _ = engine.api.set(Arc::new(api));
        engine
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn api(&self) -> Result<&Arc<ForeignApi>, FormatFailure> {
        self.api
            .get()
            .ok_or_else(|| FormatFailure::Engine("foreign engine not loaded".into()))
    }
}

impl Engine for DylibEngine {
    fn name(&self) -> &str {
        "dylib"
    }

    fn initialize(&self) -> Result<(), BridgeError> {
        if self.api.get().is_none() {
            tracing::debug!(path = %self.path.display(), prefix = %self.prefix, "loading engine library");
            let api = ForeignApi::load(&self.path, &self.prefix).map_err(BridgeError::Initialization)?;
            let _ = self.api.set(Arc::new(api));
        }

        let api = self.api().map_err(BridgeError::Format)?;
        // SAFETY: resolved with the documented signature.
        let status = unsafe { (api.init)() };
        if status != 0 {
            return Err(BridgeError::Initialization(format!(
                "{}_init returned {status}",
                self.prefix
            )));
        }
        Ok(())
    }

    fn format(&self, source: &[u8]) -> Result<ResultBuffer, FormatFailure> {
        let api = self.api()?;
        let len = i64::try_from(source.len())
            .map_err(|_| FormatFailure::Engine("input too large".into()))?;
        let mut status = StatusCode::Ok.as_raw();

        // SAFETY: `source` is valid for `len` bytes for the duration of the call.
        let handle = unsafe { (api.format_buffer)(source.as_ptr(), len, &mut status) };

        match NonNull::new(handle) {
            Some(handle) => {
                let result = ForeignResult::new(handle, Arc::clone(api));
                tracing::trace!(len = result.as_bytes().len(), "foreign engine formatted buffer");
                Ok(ResultBuffer::from_foreign(result))
            }
            None => Err(FormatFailure::from_status(status)),
        }
    }
}

impl std::fmt::Debug for DylibEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DylibEngine")
            .field("path", &self.path)
            .field("prefix", &self.prefix)
            .field("loaded", &self.api.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // A tiny in-process engine that upper-cases its input.
    static FREES: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn test_init() -> c_int {
        0
    }

    unsafe extern "C" fn failing_init() -> c_int {
        3
    }

    unsafe extern "C" fn test_format(ptr: *const u8, len: i64, status: *mut i64) -> *mut c_void {
        let input = std::slice::from_raw_parts(ptr, len as usize);
        if input.starts_with(b"!") {
            *status = StatusCode::SyntaxError.as_raw();
            return std::ptr::null_mut();
        }
        let out: Box<Vec<u8>> = Box::new(input.to_ascii_uppercase());
        Box::into_raw(out).cast()
    }

    unsafe extern "C" fn test_ptr(handle: *const c_void) -> *const u8 {
        (*handle.cast::<Vec<u8>>()).as_ptr()
    }

    unsafe extern "C" fn test_len(handle: *const c_void) -> i64 {
        (*handle.cast::<Vec<u8>>()).len() as i64
    }

    unsafe extern "C" fn test_free(handle: *mut c_void) {
        FREES.fetch_add(1, Ordering::SeqCst);
        drop(Box::from_raw(handle.cast::<Vec<u8>>()));
    }

    fn api(init: InitFn) -> ForeignApi {
        ForeignApi {
            init,
            format_buffer: test_format,
            result_ptr: test_ptr,
            result_len: test_len,
            result_free: test_free,
            _library: None,
        }
    }

    #[test]
    fn test_foreign_result_is_released_once() {
        let engine = DylibEngine::from_api(api(test_init));
        engine.initialize().unwrap();

        let before = FREES.load(Ordering::SeqCst);
        let result = engine.format(b"x=1").unwrap();
        assert!(result.is_foreign());
        assert_eq!(result.as_bytes(), b"X=1");
        assert_eq!(FREES.load(Ordering::SeqCst), before);
        drop(result);
        assert_eq!(FREES.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_null_result_maps_status() {
        let engine = DylibEngine::from_api(api(test_init));
        engine.initialize().unwrap();
        let err = engine.format(b"!bad").unwrap_err();
        assert_eq!(err.status(), StatusCode::SyntaxError);
    }

    #[test]
    fn test_failing_init_is_initialization_error() {
        let engine = DylibEngine::from_api(api(failing_init));
        let err = engine.initialize().unwrap_err();
        assert!(err.to_string().contains("returned 3"));
    }

    #[test]
    fn test_missing_library_fails_initialization() {
        let engine = DylibEngine::open("/nonexistent/libengine.so", None);
        assert!(matches!(
            engine.initialize(),
            Err(BridgeError::Initialization(_))
        ));
        assert!(engine.format(b"x").is_err());
    }

    #[test]
    fn test_prefix_defaults() {
        let engine = DylibEngine::open("libengine.so", None);
        assert_eq!(engine.prefix(), "fmtbridge");
        let engine = DylibEngine::open("libengine.so", Some("extfmt"));
        assert_eq!(engine.prefix(), "extfmt");
    }
}
