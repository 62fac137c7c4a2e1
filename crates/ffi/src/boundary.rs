//! The C ABI.
//!
//! Every entry point catches panics and reports them as status codes. The
//! message for the most recent failure on the calling thread is available
//! from [`fmtbridge_last_error`]. See `include/fmtbridge.h` for the C view.

use crate::bridge;
use fmtbridge_core::{
    try_write_intermediary, BridgeError, EngineState, FormatFailure, InitStatus, RawBuffer,
    ResultBuffer, StatusCode, Token,
};
use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: String) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, turning errors and panics into a status code.
fn guarded<F>(operation: &str, f: F) -> i64
where
    F: FnOnce() -> Result<(), BridgeError>,
{
    clear_last_error();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => StatusCode::Ok.as_raw(),
        Ok(Err(e)) => {
            tracing::warn!(operation, error = %e, "boundary call failed");
            let status = e.status();
            set_last_error(e.to_string());
            status.as_raw()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(operation, panic = %message, "boundary call panicked");
            set_last_error(format!("panic in {operation}: {message}"));
            StatusCode::EngineError.as_raw()
        }
    }
}

/// Formatted output owned by the caller until [`fmtbridge_result_free`].
pub struct FmtbridgeResult(ResultBuffer);

/// Initialize the engine. Returns 0 on success, 1 on failure.
///
/// Only the first call does any work; later calls return the same outcome.
#[no_mangle]
pub extern "C" fn fmtbridge_init() -> c_int {
    let status = guarded("fmtbridge_init", || match bridge().initialize() {
        InitStatus::Ok => Ok(()),
        InitStatus::Error => Err(match bridge().state() {
            EngineState::Failed(message) => BridgeError::Initialization(message),
            _ => BridgeError::NotInitialized,
        }),
    });
    if status == StatusCode::Ok.as_raw() {
        InitStatus::Ok as c_int
    } else {
        InitStatus::Error as c_int
    }
}

/// Format a whole buffer.
///
/// Returns a result the caller must release with [`fmtbridge_result_free`],
/// or null on failure with the reason in `*status`.
///
/// # Safety
///
/// `ptr` must point to `len` readable bytes (or be null with `len == 0`).
/// `status` must be null or point to writable storage.
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_format_buffer(
    ptr: *const u8,
    len: i64,
    status: *mut i64,
) -> *mut FmtbridgeResult {
    let mut result = None;
    let code = guarded("fmtbridge_format_buffer", || {
        let source = RawBuffer::from_raw_parts(ptr, len);
        result = Some(bridge().format_buffer(source)?);
        Ok(())
    });

    if !status.is_null() {
        *status = code;
    }
    match result {
        Some(buffer) => Box::into_raw(Box::new(FmtbridgeResult(buffer))),
        None => ptr::null_mut(),
    }
}

/// Pointer to the formatted bytes. Not NUL-terminated; use the length.
///
/// # Safety
///
/// `result` must be null or a live result from [`fmtbridge_format_buffer`].
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_result_ptr(result: *const FmtbridgeResult) -> *const u8 {
    match result.as_ref() {
        Some(r) => r.0.as_ptr(),
        None => ptr::null(),
    }
}

/// Length of the formatted bytes.
///
/// # Safety
///
/// `result` must be null or a live result from [`fmtbridge_format_buffer`].
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_result_len(result: *const FmtbridgeResult) -> i64 {
    match result.as_ref() {
        Some(r) => r.0.len() as i64,
        None => 0,
    }
}

/// Release a result. Null is ignored.
///
/// # Safety
///
/// `result` must be null or a live result from [`fmtbridge_format_buffer`];
/// it must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_result_free(result: *mut FmtbridgeResult) {
    if !result.is_null() {
        drop(Box::from_raw(result));
    }
}

/// Format a pre-parsed tree and write the output to standard output.
///
/// # Safety
///
/// Both buffers must satisfy the [`RawBuffer`] contract.
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_format_to_stdout(
    source: RawBuffer<'_>,
    tree: RawBuffer<'_>,
) -> i64 {
    guarded("fmtbridge_format_to_stdout", || {
        bridge().format_to_stdout(source, tree).map(drop)
    })
}

/// Format a pre-parsed tree and write the output to the file at `path`.
///
/// The file is replaced only once the output is complete.
///
/// # Safety
///
/// All buffers must satisfy the [`RawBuffer`] contract.
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_format_to_file(
    path: RawBuffer<'_>,
    source: RawBuffer<'_>,
    tree: RawBuffer<'_>,
) -> i64 {
    guarded("fmtbridge_format_to_file", || {
        let path = decode_path(path)?.ok_or_else(|| BridgeError::BadFileName(String::new()))?;
        bridge().format_to_file(path, source, tree).map(drop)
    })
}

/// Pull callback: store the next token in `*token` and return 1, return 0
/// when the stream is complete, or a negative value to abort.
pub type NextTokenFn =
    unsafe extern "C" fn(ctx: *mut c_void, token: *mut RawBuffer<'static>) -> c_int;

/// Stream tokens from the host to `path`, or to standard output when `path`
/// is null.
///
/// Each token is written before the next one is requested; the bytes only
/// need to stay valid until the callback is invoked again. A negative
/// callback result aborts the stream and leaves a file target untouched.
/// Standard output cannot be rolled back: tokens written before the abort
/// stay on stdout.
///
/// # Safety
///
/// `path` must satisfy the [`RawBuffer`] contract. `next` must be safe to call
/// with `ctx` until it returns a value other than 1.
#[no_mangle]
pub unsafe extern "C" fn fmtbridge_write_intermediary(
    path: RawBuffer<'_>,
    next: Option<NextTokenFn>,
    ctx: *mut c_void,
) -> i64 {
    guarded("fmtbridge_write_intermediary", || {
        let next = next.ok_or(BridgeError::InvalidArgument("missing token callback"))?;
        let path = decode_path(path)?;
        let tokens = CallbackTokens {
            next,
            ctx,
            done: false,
        };
        try_write_intermediary(path, tokens).map(drop)
    })
}

/// Message for the last failure on this thread, or null.
///
/// The pointer stays valid until the next call into this library from the
/// same thread.
#[no_mangle]
pub extern "C" fn fmtbridge_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(message) => message.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn fmtbridge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

/// Null means "no path"; anything else must be a non-empty UTF-8 path.
fn decode_path<'a>(path: RawBuffer<'a>) -> Result<Option<&'a Path>, BridgeError> {
    if path.is_null() {
        return Ok(None);
    }
    let bytes = path.try_as_bytes()?;
    let text = std::str::from_utf8(bytes)
        .map_err(|_| BridgeError::BadFileName(String::from_utf8_lossy(bytes).into_owned()))?;
    if text.is_empty() {
        return Err(BridgeError::BadFileName(String::new()));
    }
    Ok(Some(Path::new(text)))
}

/// Adapts the pull callback to an iterator of tokens.
struct CallbackTokens {
    next: NextTokenFn,
    ctx: *mut c_void,
    done: bool,
}

impl Iterator for CallbackTokens {
    type Item = Result<Token<'static>, FormatFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut slot = RawBuffer::null();
        // SAFETY: the caller of fmtbridge_write_intermediary vouched for `next`
        // and `ctx`.
        let rc = unsafe { (self.next)(self.ctx, &mut slot) };
        match rc {
            1 => match slot.try_as_bytes() {
                Ok(bytes) => Some(Ok(Token::from(bytes.to_vec()))),
                Err(e) => {
                    self.done = true;
                    Some(Err(FormatFailure::Engine(e.to_string())))
                }
            },
            0 => {
                self.done = true;
                None
            }
            code => {
                self.done = true;
                Some(Err(FormatFailure::Engine(format!(
                    "token source aborted with {code}"
                ))))
            }
        }
    }
}
