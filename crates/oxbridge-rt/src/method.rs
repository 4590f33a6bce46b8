//! Method and ivar accessors.

use crate::abi::{RawImp, RawIvar, RawMethod, RawSel, imp_addr, imp_from_addr};
use crate::class::{IvarInner, MethodInner, invalidate_caches};
use crate::encoding;
use crate::memory;
use std::ffi::{c_char, c_uint};
use std::sync::atomic::Ordering;

unsafe fn method_ref(method: RawMethod) -> Option<&'static MethodInner> {
    // SAFETY: methods are leaked `MethodInner`s
    unsafe { method.cast::<MethodInner>().as_ref() }
}

unsafe fn ivar_ref(ivar: RawIvar) -> Option<&'static IvarInner> {
    // SAFETY: ivars are leaked `IvarInner`s
    unsafe { ivar.cast::<IvarInner>().as_ref() }
}

fn type_tokens(method: &MethodInner) -> Vec<&str> {
    method
        .types
        .to_str()
        .ok()
        .and_then(encoding::split_types)
        .unwrap_or_default()
}

/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_get_name(method: RawMethod) -> RawSel {
    // SAFETY: caller contract
    unsafe { method_ref(method) }.map_or(std::ptr::null(), MethodInner::selector)
}

/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_get_implementation(method: RawMethod) -> RawImp {
    // SAFETY: caller contract
    unsafe { method_ref(method) }.and_then(MethodInner::imp)
}

/// Swaps in a new implementation and returns the previous one.
///
/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_set_implementation(method: RawMethod, imp: RawImp) -> RawImp {
    // SAFETY: caller contract
    let Some(method) = (unsafe { method_ref(method) }) else {
        return None;
    };
    if imp.is_none() {
        return None;
    }
    let previous = method.imp.swap(imp_addr(imp), Ordering::AcqRel);
    invalidate_caches();
    imp_from_addr(previous)
}

/// # Safety
///
/// Both arguments must be null or methods of this runtime.
pub unsafe extern "C" fn method_exchange_implementations(lhs: RawMethod, rhs: RawMethod) {
    // SAFETY: caller contract
    let (Some(lhs), Some(rhs)) = (unsafe { method_ref(lhs) }, unsafe { method_ref(rhs) }) else {
        return;
    };
    let left = lhs.imp.load(Ordering::Acquire);
    let right = rhs.imp.swap(left, Ordering::AcqRel);
    lhs.imp.store(right, Ordering::Release);
    invalidate_caches();
}

/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_get_type_encoding(method: RawMethod) -> *const c_char {
    // SAFETY: caller contract
    unsafe { method_ref(method) }.map_or(std::ptr::null(), |m| m.types.as_ptr())
}

/// Counts arguments including the implicit receiver and selector.
///
/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_get_number_of_arguments(method: RawMethod) -> c_uint {
    // SAFETY: caller contract
    let Some(method) = (unsafe { method_ref(method) }) else {
        return 0;
    };
    let count = type_tokens(method).len().saturating_sub(1);
    c_uint::try_from(count).unwrap_or(c_uint::MAX)
}

/// Returns the return type as a `malloc`'d string.
///
/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_copy_return_type(method: RawMethod) -> *mut c_char {
    // SAFETY: caller contract
    let Some(method) = (unsafe { method_ref(method) }) else {
        return std::ptr::null_mut();
    };
    type_tokens(method)
        .first()
        .map_or(std::ptr::null_mut(), |ty| memory::copy_str(ty))
}

/// Returns argument `index` (0 is the receiver) as a `malloc`'d string, or
/// null when out of range.
///
/// # Safety
///
/// `method` must be null or a method of this runtime.
pub unsafe extern "C" fn method_copy_argument_type(method: RawMethod, index: c_uint) -> *mut c_char {
    // SAFETY: caller contract
    let Some(method) = (unsafe { method_ref(method) }) else {
        return std::ptr::null_mut();
    };
    let Ok(index) = usize::try_from(index) else {
        return std::ptr::null_mut();
    };
    type_tokens(method)
        .get(index + 1)
        .map_or(std::ptr::null_mut(), |ty| memory::copy_str(ty))
}

/// # Safety
///
/// `ivar` must be null or an ivar of this runtime.
pub unsafe extern "C" fn ivar_get_name(ivar: RawIvar) -> *const c_char {
    // SAFETY: caller contract
    unsafe { ivar_ref(ivar) }.map_or(std::ptr::null(), |i| i.name.as_ptr())
}

/// # Safety
///
/// `ivar` must be null or an ivar of this runtime.
pub unsafe extern "C" fn ivar_get_offset(ivar: RawIvar) -> isize {
    // SAFETY: caller contract
    unsafe { ivar_ref(ivar) }.map_or(0, |i| i.offset)
}

/// # Safety
///
/// `ivar` must be null or an ivar of this runtime.
pub unsafe extern "C" fn ivar_get_type_encoding(ivar: RawIvar) -> *const c_char {
    // SAFETY: caller contract
    unsafe { ivar_ref(ivar) }.map_or(std::ptr::null(), |i| i.types.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{self, class_get_instance_method};
    use crate::{root, selector};
    use std::ffi::CStr;

    unsafe extern "C" fn first() {}
    unsafe extern "C" fn second() {}

    fn take_string(ptr: *mut c_char) -> String {
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { libc::free(ptr.cast()) };
        s
    }

    #[test]
    fn test_type_copies() {
        root::ensure_installed();
        let cls = class::allocate_pair(class::lookup("Object"), "MethodTestTypes", 0).unwrap();
        let sel = selector::intern("moveTo:by:");
        assert!(cls.add_method(sel, Some(first), "v32@0:8{CGPoint=dd}16d24"));
        let method = unsafe { class_get_instance_method(cls.as_raw(), sel) };

        assert_eq!(unsafe { method_get_number_of_arguments(method) }, 4);
        assert_eq!(take_string(unsafe { method_copy_return_type(method) }), "v");
        assert_eq!(take_string(unsafe { method_copy_argument_type(method, 2) }), "{CGPoint=dd}");
        assert!(unsafe { method_copy_argument_type(method, 4) }.is_null());
    }

    #[test]
    fn test_exchange_implementations() {
        root::ensure_installed();
        let cls = class::allocate_pair(class::lookup("Object"), "MethodTestExchange", 0).unwrap();
        let a = selector::intern("methodTestA");
        let b = selector::intern("methodTestB");
        assert!(cls.add_method(a, Some(first), "v@:"));
        assert!(cls.add_method(b, Some(second), "v@:"));

        let (ma, mb) = unsafe {
            (class_get_instance_method(cls.as_raw(), a), class_get_instance_method(cls.as_raw(), b))
        };
        unsafe { method_exchange_implementations(ma, mb) };
        assert_eq!(imp_addr(cls.lookup_imp(a)), second as usize);
        assert_eq!(imp_addr(cls.lookup_imp(b)), first as usize);

        let previous = unsafe { method_set_implementation(ma, Some(first)) };
        assert_eq!(imp_addr(previous), second as usize);
    }
}
