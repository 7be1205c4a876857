//! # hostlink-ffi
//!
//! C ABI over a process-wide [`Bridge`].
//!
//! The embedding program builds the bridge around its network engine and
//! calls [`install`] once at startup; every `hostlink_*` entry point then
//! operates on that bridge. Calls made before `install` fail with
//! "bridge not installed".
//!
//! ## Conventions
//!
//! - Fallible entry points return an error message, or null on success.
//!   Messages are NUL-terminated and must be released with
//!   `hostlink_error_free`.
//! - Results come back through out-parameters, which are written only on
//!   success.
//! - Handles are plain `i32`. A handle is only meaningful with the entry
//!   points for its own kind.

use std::ffi::CStr;
use std::ffi::CString;
use std::ffi::c_char;
use std::ptr;
use std::sync::OnceLock;

use hostlink::Bridge;

pub mod buffer;
pub mod client;
pub mod network;
pub mod router;
pub mod rpc;

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Makes `bridge` the process-wide bridge. Returns false, dropping `bridge`,
/// if one is already installed.
pub fn install(bridge: Bridge) -> bool {
    match BRIDGE.set(bridge) {
        Ok(()) => {
            tracing::debug!("bridge installed");
            true
        }
        Err(_) => {
            tracing::warn!("bridge already installed");
            false
        }
    }
}

/// The installed bridge, if any.
pub fn bridge() -> Option<&'static Bridge> {
    BRIDGE.get()
}

pub(crate) fn error_message(msg: impl Into<String>) -> *mut c_char {
    let msg = msg.into().replace('\0', "\u{fffd}");
    CString::new(msg).unwrap_or_default().into_raw()
}

/// Runs `f` against the installed bridge.
pub(crate) fn run(f: impl FnOnce(&Bridge) -> hostlink::Result<()>) -> *mut c_char {
    let Some(bridge) = BRIDGE.get() else {
        return error_message("bridge not installed");
    };
    match f(bridge) {
        Ok(()) => ptr::null_mut(),
        Err(e) => error_message(e.to_string()),
    }
}

/// Runs `f` against the installed bridge and writes its result to `out`.
///
/// # Safety
///
/// `out` must be null or valid for a write of `R`.
pub(crate) unsafe fn run_into<T, R: From<T>>(out: *mut R, f: impl FnOnce(&Bridge) -> hostlink::Result<T>) -> *mut c_char {
    if out.is_null() {
        return error_message("null output pointer");
    }
    let Some(bridge) = BRIDGE.get() else {
        return error_message("bridge not installed");
    };
    match f(bridge) {
        Ok(value) => {
            unsafe { out.write(R::from(value)) };
            ptr::null_mut()
        }
        Err(e) => error_message(e.to_string()),
    }
}

/// Releases an error message returned by any entry point. Null is ignored.
///
/// # Safety
///
/// `error` must have been returned by this library and not freed before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_error_free(error: *mut c_char) {
    if !error.is_null() {
        unsafe {
            drop(CString::from_raw(error));
        }
    }
}

/// Version of this library. The string is static and must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_version() -> *const c_char {
    static VERSION: OnceLock<CString> = OnceLock::new();
    VERSION
        .get_or_init(|| CString::new(env!("CARGO_PKG_VERSION")).unwrap_or_default())
        .as_ptr()
}

/// Writes the network engine's source revision to `out`.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_engine_git_version(out: *mut buffer::OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| Ok(bridge.engine_git_version().into_bytes())) }
}

/// Writes the network engine's dependency list to `out`.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_engine_dependencies(out: *mut buffer::OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| Ok(bridge.engine_dependencies().into_bytes())) }
}

/// Prints diagnostics to stderr. `filter` may be null to use `HOSTLINK_LOG`.
/// Returns false if logging was already set up.
///
/// # Safety
///
/// `filter` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_init_logging(filter: *const c_char) -> bool {
    if filter.is_null() {
        return hostlink::logging::init(None);
    }
    let filter = unsafe { CStr::from_ptr(filter) }.to_string_lossy();
    hostlink::logging::init(Some(&filter))
}
