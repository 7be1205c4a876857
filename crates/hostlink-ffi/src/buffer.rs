//! Byte buffers at the boundary.
//!
//! Two shapes cross the boundary:
//!
//! - [`ByteSlice`]: a borrowed view. The host uses it for arguments, and the
//!   bridge uses it for data passed to router slots. A view is valid only for
//!   the duration of the call it was passed to; the receiver copies anything it
//!   keeps.
//! - [`OwnedBuffer`]: a buffer allocated by the bridge and handed to the host,
//!   who owns it from then on and releases it with `hostlink_buffer_free`.

use std::ptr;
use std::slice;

/// Borrowed bytes. A null `data` is the empty slice.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct ByteSlice {
    pub data: *const u8,
    pub len: usize,
}

impl ByteSlice {
    pub const fn empty() -> Self {
        Self {
            data: ptr::null(),
            len: 0,
        }
    }

    /// Views `bytes` for the duration of a call.
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            data: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// # Safety
    ///
    /// `data` must be null or point to `len` readable bytes that stay valid
    /// and unmodified for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.data.is_null() || self.len == 0 {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    /// Copies the viewed bytes.
    ///
    /// # Safety
    ///
    /// Same as [`as_bytes`](Self::as_bytes).
    pub unsafe fn to_vec(&self) -> Vec<u8> {
        unsafe { self.as_bytes() }.to_vec()
    }

    /// Copies the viewed bytes as text, replacing invalid UTF-8.
    ///
    /// # Safety
    ///
    /// Same as [`as_bytes`](Self::as_bytes).
    pub unsafe fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(unsafe { self.as_bytes() }).into_owned()
    }
}

/// Bytes allocated by the bridge and owned by the host.
#[repr(C)]
#[derive(Debug)]
pub struct OwnedBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl OwnedBuffer {
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }
}

impl From<Vec<u8>> for OwnedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let data = Box::into_raw(boxed) as *mut u8;
        Self { data, len }
    }
}

/// Releases a buffer previously returned by the bridge. Null is ignored.
///
/// # Safety
///
/// `buffer` must have been produced by the bridge and not freed before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_buffer_free(buffer: OwnedBuffer) {
    if buffer.data.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(buffer.data, buffer.len)));
    }
}
