//! # C ABI
//!
//! Every exported function is `extern "C"`, prefixed `vkp_`, and never lets a
//! Rust error or panic cross the boundary. Failures return a null handle or
//! `false` and leave a message for [`vkp_last_error`].
//!
//! Objects are exposed as [`vkp_handle`]s (see [`handle`]). The render context
//! is the exception: it is only valid during the host's update callback and is
//! passed to it as a raw [`vkp_context`] pointer.

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub mod commands;
pub mod descriptors;
pub mod handle;
mod context;
mod input;
mod platform;

pub use context::*;
pub use handle::{vkp_handle, NULL_HANDLE};
pub use input::*;
pub use platform::*;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: &str) {
    log::error!("{message}");
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|last| *last.borrow_mut() = Some(message));
}

/// Message of the last failed call on this thread, or null
///
/// The pointer stays valid until the next failing call on the same thread.
#[no_mangle]
pub extern "C" fn vkp_last_error() -> *const c_char {
    LAST_ERROR.with(|last| {
        last.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |message| message.as_ptr())
    })
}

/// Run `body`, turning errors and panics into `fallback` plus a last-error message
pub(crate) fn guard<T, E, F>(name: &str, fallback: T, body: F) -> T
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            set_last_error(&format!("{name}: {e}"));
            fallback
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            set_last_error(&format!("{name} panicked: {reason}"));
            fallback
        }
    }
}

/// Errors raised while decoding host input
#[derive(thiserror::Error, Debug)]
pub enum FfiError {
    /// A required pointer was null
    #[error("null pointer for {0}")]
    NullPointer(&'static str),

    /// A handle was null, stale or of the wrong kind
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    /// An enum discriminant was out of range
    #[error("unknown {kind} value {value}")]
    UnknownValue {
        /// Enum name
        kind: &'static str,
        /// Rejected discriminant
        value: u32,
    },

    /// A string was not UTF-8
    #[error("{0} is not valid UTF-8")]
    InvalidString(&'static str),

    /// The call was made outside the update callback
    #[error("render context is only valid inside the update callback")]
    NoContext,

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    /// The surface layer failed
    #[error(transparent)]
    Surface(#[from] crate::surface::SurfaceError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Result type for decoding host input
pub type FfiResult<T> = Result<T, FfiError>;

/// Slice from a pointer and length; null is only allowed when empty
///
/// # Safety
/// `ptr` must point to `len` readable values that outlive the returned slice.
pub(crate) unsafe fn slice<'a, T>(ptr: *const T, len: usize, what: &'static str) -> FfiResult<&'a [T]> {
    if len == 0 {
        Ok(&[])
    } else if ptr.is_null() {
        Err(FfiError::NullPointer(what))
    } else {
        Ok(std::slice::from_raw_parts(ptr, len))
    }
}

/// Borrowed UTF-8 string from a C string
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn string<'a>(ptr: *const c_char, what: &'static str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FfiError::InvalidString(what))
}

/// Copy `text` into a NUL-terminated buffer, truncating to fit; returns the full length
///
/// # Safety
/// `buffer` must be null or writable for `capacity` bytes.
pub(crate) unsafe fn copy_str(text: &str, buffer: *mut c_char, capacity: usize) -> usize {
    if !buffer.is_null() && capacity > 0 {
        let copied = text.len().min(capacity - 1);
        std::ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), buffer, copied);
        *buffer.add(copied) = 0;
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_error() -> Option<String> {
        let ptr = vkp_last_error();
        (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    #[test]
    fn test_guard_passes_values_through() {
        assert_eq!(guard("ok", 0, || Ok::<_, FfiError>(5)), 5);
    }

    #[test]
    fn test_guard_records_errors() {
        let value = guard("vkp_test", 0, || Err::<i32, _>(FfiError::NullPointer("data")));
        assert_eq!(value, 0);
        assert_eq!(last_error().as_deref(), Some("vkp_test: null pointer for data"));
    }

    #[test]
    fn test_guard_catches_panics() {
        let value = guard("vkp_panics", false, || -> FfiResult<bool> { panic!("boom") });
        assert!(!value);
        assert_eq!(last_error().as_deref(), Some("vkp_panics panicked: boom"));
    }

    #[test]
    fn test_slice_rejects_null_with_length() {
        let empty: &[u32] = unsafe { slice(std::ptr::null(), 0, "empty") }.unwrap();
        assert!(empty.is_empty());
        assert!(matches!(
            unsafe { slice::<u32>(std::ptr::null(), 2, "values") },
            Err(FfiError::NullPointer("values"))
        ));
        let data = [1_u32, 2, 3];
        assert_eq!(unsafe { slice(data.as_ptr(), 2, "data") }.unwrap(), &[1, 2]);
    }

    #[test]
    fn test_string_conversion() {
        let title = CString::new("window").unwrap();
        assert_eq!(unsafe { string(title.as_ptr(), "title") }.unwrap(), "window");
        assert!(matches!(
            unsafe { string(std::ptr::null(), "title") },
            Err(FfiError::NullPointer("title"))
        ));
    }

    #[test]
    fn test_copy_str_truncates_and_terminates() {
        let mut buffer = [b'x' as c_char; 4];
        let len = unsafe { copy_str("gamepad", buffer.as_mut_ptr(), buffer.len()) };
        assert_eq!(len, 7);
        assert_eq!(unsafe { CStr::from_ptr(buffer.as_ptr()) }.to_str().unwrap(), "gam");
        assert_eq!(unsafe { copy_str("gamepad", std::ptr::null_mut(), 0) }, 7);
    }
}
