//! Buffers handed to callers that must be released with `free`.

use std::ffi::{c_char, c_uint};

/// Copies `items` into a `malloc`'d array and stores the count in `out_count`.
///
/// An empty list yields a null pointer and a count of zero.
///
/// # Safety
///
/// `out_count` must be null or valid for a write.
pub(crate) unsafe fn copy_list<T: Copy>(items: &[T], out_count: *mut c_uint) -> *mut T {
    if !out_count.is_null() {
        #[allow(clippy::cast_possible_truncation)]
        // SAFETY: caller guarantees the pointer is writable
        unsafe {
            *out_count = items.len() as c_uint;
        }
    }
    if items.is_empty() {
        return std::ptr::null_mut();
    }

    let bytes = std::mem::size_of_val(items);
    // SAFETY: plain allocation, checked for null below
    let buffer = unsafe { libc::malloc(bytes) }.cast::<T>();
    if buffer.is_null() {
        return buffer;
    }
    // SAFETY: buffer holds `items.len()` elements and does not overlap `items`
    unsafe { std::ptr::copy_nonoverlapping(items.as_ptr(), buffer, items.len()) };
    buffer
}

/// Copies `s` into a `malloc`'d NUL-terminated string.
pub(crate) fn copy_str(s: &str) -> *mut c_char {
    let bytes = s.as_bytes();
    // SAFETY: plain allocation, checked for null below
    let buffer = unsafe { libc::malloc(bytes.len() + 1) }.cast::<u8>();
    if buffer.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: buffer has room for the bytes plus the terminator
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
        *buffer.add(bytes.len()) = 0;
    }
    buffer.cast()
}

/// The deallocation primitive paired with every `copy_*` buffer.
///
/// # Safety
///
/// `ptr` must be null or a buffer returned by this runtime.
pub unsafe extern "C" fn runtime_free(ptr: *mut std::ffi::c_void) {
    // SAFETY: forwarded caller contract
    unsafe { libc::free(ptr) };
}
