//! Instances: allocation, disposal and `isa` access.
//!
//! An instance is a zeroed `calloc` block of the class's instance size whose
//! first word is the class pointer.

use crate::abi::{RawClass, RawId};
use crate::assoc;
use crate::class::{ClassInner, class_ref};
use std::ffi::{c_char, c_void};

/// Reads the `isa` of an object or class.
///
/// # Safety
///
/// `obj` must be non-null and point at an object of this runtime.
pub(crate) unsafe fn isa(obj: RawId) -> &'static ClassInner {
    // SAFETY: every object starts with its class pointer
    unsafe { &**obj.cast::<*mut ClassInner>() }
}

/// Allocates a zeroed instance of `cls` with `extra_bytes` of trailing storage.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_create_instance(cls: RawClass, extra_bytes: usize) -> RawId {
    // SAFETY: caller contract
    let Some(inner) = (unsafe { class_ref(cls) }) else {
        return std::ptr::null_mut();
    };
    if inner.meta {
        return std::ptr::null_mut();
    }
    let size = inner.instance_size().max(std::mem::size_of::<usize>()) + extra_bytes;
    // SAFETY: plain allocation, checked below
    let obj = unsafe { libc::calloc(1, size) };
    if obj.is_null() {
        return obj;
    }
    // SAFETY: the block is at least one pointer wide
    unsafe { *obj.cast::<RawClass>() = cls };
    obj
}

/// Frees an instance and drops its associations.
///
/// # Safety
///
/// `obj` must be null or an instance created by [`class_create_instance`]
/// that has not been disposed yet.
pub unsafe extern "C" fn object_dispose(obj: RawId) -> RawId {
    if obj.is_null() {
        return obj;
    }
    assoc::remove_all(obj);
    // SAFETY: caller contract
    unsafe { libc::free(obj) };
    std::ptr::null_mut()
}

/// # Safety
///
/// `obj` must be null or an object of this runtime.
pub unsafe extern "C" fn object_get_class(obj: RawId) -> RawClass {
    if obj.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: caller contract
    unsafe { isa(obj) }.as_raw()
}

/// Replaces the class of an instance, returning the previous class.
///
/// # Safety
///
/// `obj` must be null or an instance of this runtime and `cls` a class whose
/// instance size does not exceed the object's allocation.
pub unsafe extern "C" fn object_set_class(obj: RawId, cls: RawClass) -> RawClass {
    if obj.is_null() || cls.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: caller contract
    unsafe {
        let slot = obj.cast::<RawClass>();
        std::mem::replace(&mut *slot, cls)
    }
}

/// # Safety
///
/// `obj` must be null or an object of this runtime.
pub unsafe extern "C" fn object_get_class_name(obj: RawId) -> *const c_char {
    if obj.is_null() {
        return c"nil".as_ptr();
    }
    // SAFETY: caller contract
    unsafe { isa(obj) }.name.as_ptr()
}

/// True when `obj` is a class or metaclass rather than an instance.
///
/// # Safety
///
/// `obj` must be null or an object of this runtime.
pub unsafe extern "C" fn object_is_class(obj: RawId) -> bool {
    // SAFETY: caller contract
    !obj.is_null() && unsafe { isa(obj) }.meta
}

/// Returns the storage past the declared ivars: the `extra_bytes` of an
/// instance, or the class storage requested at class allocation for a class
/// object (null when none was requested).
///
/// # Safety
///
/// `obj` must be null or an object of this runtime.
pub unsafe extern "C" fn object_get_indexed_ivars(obj: RawId) -> *mut c_void {
    if obj.is_null() {
        return obj;
    }
    // SAFETY: caller contract
    let cls = unsafe { isa(obj) };
    if cls.meta {
        // SAFETY: objects whose isa is a metaclass are classes
        return unsafe { class_ref(obj.cast()) }.map_or(std::ptr::null_mut(), |cls| cls.indexed_ivars.cast());
    }
    let size = cls.instance_size().max(std::mem::size_of::<usize>());
    // SAFETY: instances are allocated with at least `size` bytes
    unsafe { obj.cast::<u8>().add(size).cast() }
}
