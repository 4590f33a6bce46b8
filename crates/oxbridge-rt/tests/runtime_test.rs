//! C ABI tests for the builtin runtime
//!
//! - Class pairs, methods and lookups through the exported functions
//! - Forwarding of unknown selectors into the exception slot
//! - Superclass lookups
//! - Copied lists released with `runtime_free`
//! - Reparenting, class variables, ivar layouts and indexed storage
//!
//! Run with: `cargo test -p oxbridge-rt --test runtime_test`

use oxbridge_rt::*;
use std::ffi::{CStr, CString, c_uint};
use std::sync::atomic::{AtomicUsize, Ordering};

static CLASS_ID: AtomicUsize = AtomicUsize::new(0);

fn unique(prefix: &str) -> CString {
    CString::new(format!("{prefix}_{}", CLASS_ID.fetch_add(1, Ordering::SeqCst))).unwrap()
}

type ValueFn = unsafe extern "C" fn(RawId, RawSel) -> i64;

unsafe extern "C" fn seven(_this: RawId, _cmd: RawSel) -> i64 {
    7
}

unsafe extern "C" fn eleven(_this: RawId, _cmd: RawSel) -> i64 {
    11
}

fn imp(f: ValueFn) -> RawImp {
    Some(unsafe { std::mem::transmute::<ValueFn, unsafe extern "C" fn()>(f) })
}

unsafe fn call(imp: RawImp, receiver: RawId, sel: RawSel) -> i64 {
    let f = unsafe { std::mem::transmute::<unsafe extern "C" fn(), ValueFn>(imp.unwrap()) };
    unsafe { f(receiver, sel) }
}

unsafe fn subclass(superclass: RawClass, prefix: &str) -> RawClass {
    let name = unique(prefix);
    let cls = unsafe { objc_allocate_class_pair(superclass, name.as_ptr(), 0) };
    assert!(!cls.is_null());
    cls
}

#[test]
fn test_lookup_finds_inherited_methods() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let base = subclass(object, "Base");
        let value = sel_register_name(c"value".as_ptr());
        assert!(class_add_method(base, value, imp(seven), c"q@:".as_ptr()));
        assert!(!class_add_method(base, value, imp(eleven), c"q@:".as_ptr()));
        objc_register_class_pair(base);

        let derived = subclass(base, "Derived");
        objc_register_class_pair(derived);
        let obj = class_create_instance(derived, 0);

        assert_eq!(call(objc_msg_lookup(obj, value), obj, value), 7);
        assert!(class_responds_to_selector(derived, value));

        // overriding invalidates cached lookups
        assert!(class_add_method(derived, value, imp(eleven), c"q@:".as_ptr()));
        assert_eq!(call(objc_msg_lookup(obj, value), obj, value), 11);

        let sup = ObjcSuper {
            receiver: obj,
            super_class: base,
        };
        assert_eq!(call(objc_msg_lookup_super(&sup, value), obj, value), 7);
        object_dispose(obj);
    }
}

#[test]
fn test_unknown_selector_raises() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let obj = class_create_instance(object, 0);
        let missing = sel_register_name(c"noSuchMethod".as_ptr());

        let forward = objc_msg_lookup(obj, missing);
        assert!(forward.is_some());
        call(forward, obj, missing);

        let exception = objc_exception_take();
        assert!(!exception.is_null());
        assert_eq!(CStr::from_ptr(object_get_class_name(exception)).to_str().unwrap(), "Exception");
        assert!(objc_exception_take().is_null());
        object_dispose(obj);
    }
}

#[test]
fn test_nil_receiver_lookup() {
    unsafe {
        let sel = sel_register_name(c"anything".as_ptr());
        let nil = std::ptr::null_mut();
        assert_eq!(call(objc_msg_lookup(nil, sel), nil, sel), 0);
        assert!(objc_exception_take().is_null());
    }
}

#[test]
fn test_copied_lists() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let cls = subclass(object, "Listed");
        for name in [c"first", c"second"] {
            let sel = sel_register_name(name.as_ptr());
            assert!(class_add_method(cls, sel, imp(seven), c"q@:".as_ptr()));
        }
        assert!(class_add_ivar(cls, c"count".as_ptr(), 8, 3, c"q".as_ptr()));
        objc_register_class_pair(cls);

        let mut count: c_uint = 0;
        let methods = class_copy_method_list(cls, &mut count);
        assert_eq!(count, 2);
        let names: Vec<&str> = std::slice::from_raw_parts(methods, count as usize)
            .iter()
            .map(|&m| CStr::from_ptr(sel_get_name(method_get_name(m))).to_str().unwrap())
            .collect();
        assert!(names.contains(&"first") && names.contains(&"second"));
        runtime_free(methods.cast());

        let ivars = class_copy_ivar_list(cls, &mut count);
        assert_eq!(count, 1);
        assert_eq!(CStr::from_ptr(ivar_get_name(*ivars)).to_str().unwrap(), "count");
        assert_eq!(ivar_get_offset(*ivars), std::mem::size_of::<usize>() as isize);
        runtime_free(ivars.cast());

        let protocols = class_copy_protocol_list(cls, &mut count);
        assert_eq!(count, 0);
        assert!(protocols.is_null());
    }
}

#[test]
fn test_registered_classes_are_sealed() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let name = unique("Sealed");
        let cls = objc_allocate_class_pair(object, name.as_ptr(), 0);
        objc_register_class_pair(cls);

        assert!(!class_add_ivar(cls, c"late".as_ptr(), 8, 3, c"q".as_ptr()));
        assert!(objc_allocate_class_pair(object, name.as_ptr(), 0).is_null());
        assert_eq!(objc_get_class(name.as_ptr()), cls);
    }
}

#[test]
fn test_set_superclass_redirects_lookups() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let seven_base = subclass(object, "SevenBase");
        let eleven_base = subclass(object, "ElevenBase");
        let value = sel_register_name(c"reparentedValue".as_ptr());
        assert!(class_add_method(seven_base, value, imp(seven), c"q@:".as_ptr()));
        assert!(class_add_method(eleven_base, value, imp(eleven), c"q@:".as_ptr()));
        objc_register_class_pair(seven_base);
        objc_register_class_pair(eleven_base);

        let child = subclass(seven_base, "Reparented");
        objc_register_class_pair(child);
        let obj = class_create_instance(child, 0);
        assert_eq!(call(objc_msg_lookup(obj, value), obj, value), 7);

        assert_eq!(class_set_superclass(child, eleven_base), seven_base);
        assert_eq!(class_get_superclass(child), eleven_base);
        assert_eq!(call(objc_msg_lookup(obj, value), obj, value), 11);
        assert!(class_set_superclass(child, std::ptr::null_mut()).is_null());
        object_dispose(obj);
    }
}

#[test]
fn test_class_variable_and_layouts() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let cls = subclass(object, "Layout");
        assert!(class_add_ivar(cls, c"slot".as_ptr(), 8, 3, c"@".as_ptr()));
        assert!(class_get_class_variable(cls, c"slot".as_ptr()).is_null());
        assert!(!class_get_class_variable(cls, c"isa".as_ptr()).is_null());

        assert!(class_get_ivar_layout(cls).is_null());
        class_set_ivar_layout(cls, c"\x11".as_ptr().cast());
        class_set_weak_ivar_layout(cls, c"\x01".as_ptr().cast());
        objc_register_class_pair(cls);
        class_set_ivar_layout(cls, std::ptr::null());

        assert_eq!(CStr::from_ptr(class_get_ivar_layout(cls).cast()).to_bytes(), b"\x11");
        assert_eq!(CStr::from_ptr(class_get_weak_ivar_layout(cls).cast()).to_bytes(), b"\x01");
    }
}

#[test]
fn test_indexed_ivars() {
    unsafe {
        let object = objc_get_class(c"Object".as_ptr());
        let name = unique("Indexed");
        let cls = objc_allocate_class_pair(object, name.as_ptr(), 8);
        objc_register_class_pair(cls);

        let storage = object_get_indexed_ivars(cls).cast::<u64>();
        assert!(!storage.is_null());
        assert_eq!(*storage, 0);
        *storage = 42;
        assert_eq!(*object_get_indexed_ivars(cls).cast::<u64>(), 42);
        assert_eq!(class_get_instance_size(cls), class_get_instance_size(object));

        let obj = class_create_instance(cls, 8);
        let trailing = object_get_indexed_ivars(obj).cast::<u8>();
        assert_eq!(trailing.offset_from(obj.cast::<u8>()), 8);
        object_dispose(obj);
    }
}
