//! Runtime metadata layer: thin calls into the runtime's introspection API.
//!
//! List-returning entry points hand back a runtime-allocated buffer and a
//! count. [`RuntimeContext::collect_list`] converts every slot and then frees
//! the buffer exactly once through [`RuntimeApi::free`](super::api::RuntimeApi).

use super::api::RawClass;
use super::class::Class;
use super::context::{RuntimeContext, c_string};
use super::protocol::Protocol;
use crate::error::Result;
use std::ffi::{CStr, c_char, c_int, c_uint};

/// Copies a runtime-owned C string.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn string_from(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller contract
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

impl RuntimeContext {
    /// Calls a `copy_*` entry point, converts each element and frees the buffer.
    ///
    /// # Safety
    ///
    /// `copy` must return null or a buffer of `*count` elements that the
    /// runtime expects the caller to free.
    pub(crate) unsafe fn collect_list<T: Copy, U>(
        &self,
        copy: impl FnOnce(*mut c_uint) -> *mut T,
        convert: impl FnMut(T) -> Option<U>,
    ) -> Vec<U> {
        let mut count: c_uint = 0;
        let buffer = copy(&mut count);
        if buffer.is_null() {
            return Vec::new();
        }
        // SAFETY: caller contract
        let items = unsafe { std::slice::from_raw_parts(buffer, count as usize) };
        let converted = items.iter().copied().filter_map(convert).collect();
        // SAFETY: the buffer is runtime-owned and released once here
        unsafe { (self.api().free)(buffer.cast()) };
        converted
    }

    /// Takes ownership of a runtime-allocated string, freeing it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a string the caller is expected to free.
    pub(crate) unsafe fn take_string(&self, ptr: *mut c_char) -> Option<String> {
        // SAFETY: caller contract
        let s = unsafe { string_from(ptr) }?;
        // SAFETY: caller contract
        unsafe { (self.api().free)(ptr.cast()) };
        Some(s)
    }

    /// Looks up a registered class by name.
    ///
    /// Classes registered through [`PendingClass::register`](super::PendingClass::register)
    /// are found before asking the runtime.
    ///
    /// # Errors
    ///
    /// Fails only if `name` contains a NUL byte.
    pub fn class(&self, name: &str) -> Result<Option<Class>> {
        if let Some(cls) = self.inner().published.borrow().get(name) {
            return Ok(Some(cls.clone()));
        }
        let c_name = c_string(name)?;
        // SAFETY: c_name is a valid C string
        let raw = unsafe { (self.api().get_class)(c_name.as_ptr()) };
        Ok(self.wrap_class(raw))
    }

    /// Every registered class, via `objc_copyClassList`.
    pub fn classes(&self) -> Vec<Class> {
        // SAFETY: the runtime returns a freeable array of classes
        unsafe { self.collect_list(|count| (self.api().copy_class_list)(count), |cls| self.wrap_class(cls)) }
    }

    /// Every registered class, via the count-then-fill `objc_getClassList`.
    pub fn class_list(&self) -> Vec<Class> {
        let api = self.api();
        // SAFETY: a null buffer asks for the count only
        let count = unsafe { (api.get_class_list)(std::ptr::null_mut(), 0) };
        let Ok(len) = usize::try_from(count) else {
            return Vec::new();
        };
        let mut buffer: Vec<RawClass> = vec![std::ptr::null_mut(); len];
        let capacity = c_int::try_from(len).unwrap_or(c_int::MAX);
        // SAFETY: buffer has room for `capacity` classes
        let filled = unsafe { (api.get_class_list)(buffer.as_mut_ptr(), capacity) };
        buffer.truncate(usize::try_from(filled).unwrap_or(0).min(len));
        buffer.into_iter().filter_map(|cls| self.wrap_class(cls)).collect()
    }

    /// Looks up a protocol by name.
    ///
    /// # Errors
    ///
    /// Fails only if `name` contains a NUL byte.
    pub fn protocol(&self, name: &str) -> Result<Option<Protocol>> {
        let c_name = c_string(name)?;
        // SAFETY: c_name is a valid C string
        Ok(Protocol::from_raw(unsafe { (self.api().get_protocol)(c_name.as_ptr()) }))
    }

    /// Every registered protocol.
    pub fn protocols(&self) -> Vec<Protocol> {
        // SAFETY: the runtime returns a freeable array of protocols
        unsafe { self.collect_list(|count| (self.api().copy_protocol_list)(count), Protocol::from_raw) }
    }
}
