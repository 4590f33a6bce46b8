//! The classes every process starts with: `Object` and `Exception`.
//!
//! `Object` is the root class. It declares the `isa` ivar and provides the
//! usual allocation, identity and introspection methods on both sides.
//! `Exception` carries a name and a reason as C strings and can be raised
//! through the pending-exception slot.

use crate::abi::{RawClass, RawId, RawImp, RawSel};
use crate::class::{self, ClassInner, class_get_superclass, class_get_version, class_responds_to_selector};
use crate::memory;
use crate::message::{objc_exception_throw, objc_msg_lookup};
use crate::object::{class_create_instance, isa, object_dispose, object_get_class};
use crate::selector;
use oxbridge_log::error;
use std::ffi::{c_char, c_int};
use std::sync::OnceLock;

macro_rules! imp {
    ($f:expr, $ty:ty) => {{
        let f: $ty = $f;
        // SAFETY: IMPs are stored untyped; callers cast back through the type encoding
        Some(unsafe { std::mem::transmute::<$ty, unsafe extern "C" fn()>(f) })
    }};
}

type Getter = unsafe extern "C" fn(RawId, RawSel) -> RawId;
type Predicate = unsafe extern "C" fn(RawId, RawSel, RawId) -> bool;
type SelPredicate = unsafe extern "C" fn(RawId, RawSel, RawSel) -> bool;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the root classes on first use.
pub(crate) fn ensure_installed() {
    INSTALLED.get_or_init(|| {
        if install().is_none() {
            error!("failed to install the root classes");
        }
    });
}

fn add(cls: &ClassInner, name: &str, imp: RawImp, types: &str) {
    if !cls.add_method(selector::intern(name), imp, types) {
        error!("could not add {name} to {}", cls.name());
    }
}

/// Sends a zero-argument, object-returning message.
unsafe fn send(receiver: RawId, sel: RawSel) -> RawId {
    // SAFETY: caller passes a runtime object; lookup never returns null
    unsafe {
        let Some(imp) = objc_msg_lookup(receiver, sel) else {
            return std::ptr::null_mut();
        };
        let call = std::mem::transmute::<unsafe extern "C" fn(), Getter>(imp);
        call(receiver, sel)
    }
}

// ============================================================================
// Object
// ============================================================================

unsafe extern "C" fn object_alloc(cls: RawId, _cmd: RawSel) -> RawId {
    // SAFETY: class-side receivers are classes
    unsafe { class_create_instance(cls, 0) }
}

unsafe extern "C" fn object_new(cls: RawId, _cmd: RawSel) -> RawId {
    // SAFETY: class-side receivers are classes
    unsafe {
        let obj = class_create_instance(cls, 0);
        send(obj, selector::intern("init"))
    }
}

unsafe extern "C" fn object_self(this: RawId, _cmd: RawSel) -> RawId {
    this
}

unsafe extern "C" fn object_class(this: RawId, _cmd: RawSel) -> RawClass {
    // SAFETY: receiver is a runtime object
    unsafe { object_get_class(this) }
}

unsafe extern "C" fn object_superclass(this: RawId, _cmd: RawSel) -> RawClass {
    // SAFETY: receiver is a runtime object
    unsafe { class_get_superclass(object_get_class(this)) }
}

unsafe extern "C" fn meta_superclass(this: RawId, _cmd: RawSel) -> RawClass {
    // SAFETY: class-side receivers are classes
    unsafe { class_get_superclass(this) }
}

unsafe extern "C" fn object_is_equal(this: RawId, _cmd: RawSel, other: RawId) -> bool {
    this == other
}

unsafe extern "C" fn object_hash(this: RawId, _cmd: RawSel) -> u64 {
    this as u64
}

unsafe extern "C" fn object_responds_to(this: RawId, _cmd: RawSel, sel: RawSel) -> bool {
    // SAFETY: receiver is a runtime object
    unsafe { class_responds_to_selector(object_get_class(this), sel) }
}

unsafe extern "C" fn meta_instances_respond_to(this: RawId, _cmd: RawSel, sel: RawSel) -> bool {
    // SAFETY: class-side receivers are classes
    unsafe { class_responds_to_selector(this, sel) }
}

unsafe extern "C" fn object_is_kind_of(this: RawId, _cmd: RawSel, cls: RawClass) -> bool {
    // SAFETY: receiver is a runtime object
    unsafe { isa(this) }.chain().any(|c| c.as_raw() == cls)
}

unsafe extern "C" fn object_is_member_of(this: RawId, _cmd: RawSel, cls: RawClass) -> bool {
    // SAFETY: receiver is a runtime object
    unsafe { object_get_class(this) == cls }
}

unsafe extern "C" fn object_perform(this: RawId, _cmd: RawSel, sel: RawSel) -> RawId {
    // SAFETY: receiver is a runtime object
    unsafe { send(this, sel) }
}

unsafe extern "C" fn object_dealloc(this: RawId, _cmd: RawSel) {
    // SAFETY: receiver is a live instance
    unsafe { object_dispose(this) };
}

unsafe extern "C" fn meta_version(this: RawId, _cmd: RawSel) -> c_int {
    // SAFETY: class-side receivers are classes
    unsafe { class_get_version(this) }
}

unsafe extern "C" fn meta_resolve_nothing(_this: RawId, _cmd: RawSel, _sel: RawSel) -> bool {
    false
}

// ============================================================================
// Exception
// ============================================================================

fn exception_slot(this: RawId, ivar: &str) -> Option<*mut *mut c_char> {
    // SAFETY: receiver is a runtime object
    let cls = unsafe { isa(this) };
    let offset = cls.find_ivar(ivar)?.offset;
    // SAFETY: the ivar lies inside the instance
    Some(unsafe { this.cast::<u8>().offset(offset) }.cast())
}

unsafe extern "C" fn exception_with_name(
    cls: RawId,
    _cmd: RawSel,
    name: *const c_char,
    reason: *const c_char,
) -> RawId {
    // SAFETY: class-side receivers are classes; strings are caller provided
    unsafe {
        let obj = class_create_instance(cls, 0);
        if obj.is_null() {
            return obj;
        }
        for (ivar, value) in [("name", name), ("reason", reason)] {
            if let (Some(slot), Some(text)) = (exception_slot(obj, ivar), class::c_str(value)) {
                *slot = memory::copy_str(text);
            }
        }
        obj
    }
}

unsafe extern "C" fn exception_name(this: RawId, _cmd: RawSel) -> *const c_char {
    // SAFETY: slot points inside the receiver
    exception_slot(this, "name").map_or(std::ptr::null(), |slot| unsafe { *slot }.cast_const())
}

unsafe extern "C" fn exception_reason(this: RawId, _cmd: RawSel) -> *const c_char {
    // SAFETY: slot points inside the receiver
    exception_slot(this, "reason").map_or(std::ptr::null(), |slot| unsafe { *slot }.cast_const())
}

unsafe extern "C" fn exception_raise(this: RawId, _cmd: RawSel) {
    objc_exception_throw(this);
}

unsafe extern "C" fn exception_dealloc(this: RawId, _cmd: RawSel) {
    for ivar in ["name", "reason"] {
        if let Some(slot) = exception_slot(this, ivar) {
            // SAFETY: the strings were allocated with malloc by this module
            unsafe { libc::free((*slot).cast()) };
        }
    }
    // SAFETY: receiver is a live instance
    unsafe { object_dispose(this) };
}

/// Creates an `Exception` and parks it in the pending slot.
pub(crate) fn raise(name: &str, reason: &str) {
    let Some(cls) = class::lookup("Exception") else {
        error!("Exception class missing; dropping {name}: {reason}");
        return;
    };
    // SAFETY: Exception is a registered class
    let obj = unsafe { class_create_instance(cls.as_raw(), 0) };
    if obj.is_null() {
        return;
    }
    for (ivar, value) in [("name", name), ("reason", reason)] {
        if let Some(slot) = exception_slot(obj, ivar) {
            // SAFETY: slot points inside the fresh instance
            unsafe { *slot = memory::copy_str(value) };
        }
    }
    objc_exception_throw(obj);
}

fn install() -> Option<()> {
    let object = class::allocate_pair(None, "Object", 0)?;
    let meta = object.metaclass();
    if !object.add_ivar("isa", std::mem::size_of::<usize>(), 3, "#") {
        return None;
    }

    add(object, "init", imp!(object_self, Getter), "@@:");
    add(object, "self", imp!(object_self, Getter), "@@:");
    add(object, "class", imp!(object_class, Getter), "#@:");
    add(object, "superclass", imp!(object_superclass, Getter), "#@:");
    add(object, "isEqual:", imp!(object_is_equal, Predicate), "B@:@");
    add(object, "hash", imp!(object_hash, unsafe extern "C" fn(RawId, RawSel) -> u64), "Q@:");
    add(object, "respondsToSelector:", imp!(object_responds_to, SelPredicate), "B@::");
    add(object, "isKindOfClass:", imp!(object_is_kind_of, Predicate), "B@:#");
    add(object, "isMemberOfClass:", imp!(object_is_member_of, Predicate), "B@:#");
    add(
        object,
        "performSelector:",
        imp!(object_perform, unsafe extern "C" fn(RawId, RawSel, RawSel) -> RawId),
        "@@::",
    );
    add(object, "dealloc", imp!(object_dealloc, unsafe extern "C" fn(RawId, RawSel)), "v@:");

    add(meta, "alloc", imp!(object_alloc, Getter), "@@:");
    add(meta, "new", imp!(object_new, Getter), "@@:");
    add(meta, "class", imp!(object_self, Getter), "#@:");
    add(meta, "superclass", imp!(meta_superclass, Getter), "#@:");
    add(meta, "version", imp!(meta_version, unsafe extern "C" fn(RawId, RawSel) -> c_int), "i@:");
    add(meta, "instancesRespondToSelector:", imp!(meta_instances_respond_to, SelPredicate), "B@::");
    add(meta, "resolveInstanceMethod:", imp!(meta_resolve_nothing, SelPredicate), "B@::");
    add(meta, "resolveClassMethod:", imp!(meta_resolve_nothing, SelPredicate), "B@::");
    class::register_pair(object);

    let exception = class::allocate_pair(Some(object), "Exception", 0)?;
    let pointer = std::mem::size_of::<usize>();
    if !exception.add_ivar("name", pointer, 3, "*") || !exception.add_ivar("reason", pointer, 3, "*") {
        return None;
    }
    type Text = unsafe extern "C" fn(RawId, RawSel) -> *const c_char;
    add(exception, "name", imp!(exception_name, Text), "*@:");
    add(exception, "reason", imp!(exception_reason, Text), "*@:");
    add(exception, "raise", imp!(exception_raise, unsafe extern "C" fn(RawId, RawSel)), "v@:");
    add(exception, "dealloc", imp!(exception_dealloc, unsafe extern "C" fn(RawId, RawSel)), "v@:");
    add(
        exception.metaclass(),
        "exceptionWithName:reason:",
        imp!(
            exception_with_name,
            unsafe extern "C" fn(RawId, RawSel, *const c_char, *const c_char) -> RawId
        ),
        "@@:**",
    );
    class::register_pair(exception);
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_root_classes_installed() {
        ensure_installed();
        let object = class::lookup("Object").unwrap();
        let exception = class::lookup("Exception").unwrap();
        assert!(object.superclass().is_none());
        assert!(std::ptr::eq(exception.superclass().unwrap(), object));
        assert_eq!(object.find_ivar("isa").unwrap().offset, 0);
        assert!(exception.instance_size() >= 3 * std::mem::size_of::<usize>());
    }

    #[test]
    fn test_new_and_identity_methods() {
        ensure_installed();
        let object = class::lookup("Object").unwrap();
        let obj = unsafe { send(object.as_raw(), selector::intern("new")) };
        assert!(!obj.is_null());
        assert_eq!(unsafe { object_get_class(obj) }, object.as_raw());
        assert_eq!(unsafe { send(obj, selector::intern("self")) }, obj);
        assert_eq!(unsafe { send(object.as_raw(), selector::intern("class")) }, object.as_raw());
    }

    #[test]
    fn test_raise_sets_name_and_reason() {
        ensure_installed();
        raise("TestException", "something broke");
        let exc = crate::message::objc_exception_take();
        let name = unsafe { CStr::from_ptr(exception_name(exc, std::ptr::null())) };
        let reason = unsafe { CStr::from_ptr(exception_reason(exc, std::ptr::null())) };
        assert_eq!(name.to_str().unwrap(), "TestException");
        assert_eq!(reason.to_str().unwrap(), "something broke");
        unsafe { exception_dealloc(exc, std::ptr::null()) };
    }
}
