//! Protocols: named sets of method descriptions that classes adopt.
//!
//! Protocols do not take part in dispatch. A protocol is allocated, filled
//! with method descriptions and adopted protocols, then registered; after
//! registration it is immutable and visible to `objc_get_protocol`.

use crate::abi::{MethodDescription, RawClass, RawProtocol, RawSel};
use crate::class::{c_str, class_ref};
use crate::memory;
use crate::root;
use fxhash::FxHashMap;
use std::ffi::{CString, c_char, c_uint};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};

pub(crate) struct ProtocolMethod {
    name: usize,
    types: CString,
    required: bool,
    instance: bool,
}

pub(crate) struct ProtocolInner {
    pub(crate) name: CString,
    methods: RwLock<Vec<ProtocolMethod>>,
    adopted: RwLock<Vec<&'static ProtocolInner>>,
    registered: AtomicBool,
}

impl ProtocolInner {
    fn as_raw(&self) -> RawProtocol {
        std::ptr::from_ref(self).cast_mut().cast()
    }

    /// True if `self` is `other` or adopts it, directly or transitively.
    pub(crate) fn conforms_to(&self, other: &ProtocolInner) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.adopted
            .read()
            .is_ok_and(|adopted| adopted.iter().any(|p| p.conforms_to(other)))
    }
}

static PROTOCOLS: OnceLock<RwLock<FxHashMap<Box<str>, &'static ProtocolInner>>> = OnceLock::new();

fn protocols() -> &'static RwLock<FxHashMap<Box<str>, &'static ProtocolInner>> {
    PROTOCOLS.get_or_init(|| RwLock::new(FxHashMap::default()))
}

unsafe fn protocol_ref(protocol: RawProtocol) -> Option<&'static ProtocolInner> {
    // SAFETY: protocols are leaked `ProtocolInner`s
    unsafe { protocol.cast::<ProtocolInner>().as_ref() }
}

/// Allocates a protocol called `name`, or returns null if the name is taken.
///
/// # Safety
///
/// `name` must be null or a valid C string.
pub unsafe extern "C" fn objc_allocate_protocol(name: *const c_char) -> RawProtocol {
    root::ensure_installed();
    // SAFETY: caller contract
    let Some(name) = (unsafe { c_str(name) }) else {
        return std::ptr::null_mut();
    };
    let Ok(c_name) = CString::new(name) else {
        return std::ptr::null_mut();
    };
    let Ok(mut table) = protocols().write() else {
        return std::ptr::null_mut();
    };
    if table.contains_key(name) {
        return std::ptr::null_mut();
    }
    let protocol: &'static ProtocolInner = Box::leak(Box::new(ProtocolInner {
        name: c_name,
        methods: RwLock::new(Vec::new()),
        adopted: RwLock::new(Vec::new()),
        registered: AtomicBool::new(false),
    }));
    table.insert(name.into(), protocol);
    protocol.as_raw()
}

/// # Safety
///
/// `protocol` must be null or a protocol of this runtime.
pub unsafe extern "C" fn objc_register_protocol(protocol: RawProtocol) {
    // SAFETY: caller contract
    if let Some(protocol) = unsafe { protocol_ref(protocol) } {
        protocol.registered.store(true, Ordering::Release);
    }
}

/// Adds a method description to an unregistered protocol.
///
/// # Safety
///
/// `protocol` must be null or a protocol of this runtime; `types` a valid C string.
pub unsafe extern "C" fn protocol_add_method_description(
    protocol: RawProtocol,
    name: RawSel,
    types: *const c_char,
    is_required: bool,
    is_instance: bool,
) {
    // SAFETY: caller contract
    let (Some(protocol), Some(types)) = (unsafe { protocol_ref(protocol) }, unsafe { c_str(types) })
    else {
        return;
    };
    if protocol.registered.load(Ordering::Acquire) || name.is_null() {
        return;
    }
    let (Ok(types), Ok(mut methods)) = (CString::new(types), protocol.methods.write()) else {
        return;
    };
    methods.push(ProtocolMethod {
        name: name as usize,
        types,
        required: is_required,
        instance: is_instance,
    });
}

/// Makes `protocol` adopt `addition`. Only allowed before registration.
///
/// # Safety
///
/// Both arguments must be null or protocols of this runtime.
pub unsafe extern "C" fn protocol_add_protocol(protocol: RawProtocol, addition: RawProtocol) {
    // SAFETY: caller contract
    let (Some(protocol), Some(addition)) =
        (unsafe { protocol_ref(protocol) }, unsafe { protocol_ref(addition) })
    else {
        return;
    };
    if protocol.registered.load(Ordering::Acquire) {
        return;
    }
    if let Ok(mut adopted) = protocol.adopted.write() {
        adopted.push(addition);
    }
}

/// Returns the registered protocol called `name`, or null.
///
/// # Safety
///
/// `name` must be null or a valid C string.
pub unsafe extern "C" fn objc_get_protocol(name: *const c_char) -> RawProtocol {
    root::ensure_installed();
    // SAFETY: caller contract
    let Some(name) = (unsafe { c_str(name) }) else {
        return std::ptr::null_mut();
    };
    protocols()
        .read()
        .ok()
        .and_then(|table| table.get(name).copied())
        .filter(|p| p.registered.load(Ordering::Acquire))
        .map_or(std::ptr::null_mut(), ProtocolInner::as_raw)
}

/// Returns a `malloc`'d array of every registered protocol.
///
/// # Safety
///
/// `out_count` must be null or writable.
pub unsafe extern "C" fn objc_copy_protocol_list(out_count: *mut c_uint) -> *mut RawProtocol {
    root::ensure_installed();
    let list: Vec<RawProtocol> = protocols()
        .read()
        .map(|table| {
            table
                .values()
                .filter(|p| p.registered.load(Ordering::Acquire))
                .map(|p| p.as_raw())
                .collect()
        })
        .unwrap_or_default();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&list, out_count) }
}

/// # Safety
///
/// `protocol` must be null or a protocol of this runtime.
pub unsafe extern "C" fn protocol_get_name(protocol: RawProtocol) -> *const c_char {
    // SAFETY: caller contract
    unsafe { protocol_ref(protocol) }.map_or(std::ptr::null(), |p| p.name.as_ptr())
}

/// Returns a `malloc`'d array of the matching method descriptions.
///
/// The `types` strings point into the protocol and must not be freed.
///
/// # Safety
///
/// `protocol` must be null or a protocol of this runtime; `out_count` null or writable.
pub unsafe extern "C" fn protocol_copy_method_description_list(
    protocol: RawProtocol,
    is_required: bool,
    is_instance: bool,
    out_count: *mut c_uint,
) -> *mut MethodDescription {
    // SAFETY: caller contract
    let list: Vec<MethodDescription> = unsafe { protocol_ref(protocol) }
        .and_then(|p| p.methods.read().ok())
        .map(|methods| {
            methods
                .iter()
                .filter(|m| m.required == is_required && m.instance == is_instance)
                .map(|m| MethodDescription {
                    name: m.name as RawSel,
                    types: m.types.as_ptr(),
                })
                .collect()
        })
        .unwrap_or_default();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&list, out_count) }
}

/// # Safety
///
/// Both arguments must be null or protocols of this runtime.
pub unsafe extern "C" fn protocol_conforms_to_protocol(protocol: RawProtocol, other: RawProtocol) -> bool {
    // SAFETY: caller contract
    match unsafe { (protocol_ref(protocol), protocol_ref(other)) } {
        (Some(protocol), Some(other)) => protocol.conforms_to(other),
        _ => false,
    }
}

/// Declares that `cls` adopts `protocol`. Returns false if it already does.
///
/// # Safety
///
/// `cls` must be null or a class and `protocol` null or a protocol of this runtime.
pub unsafe extern "C" fn class_add_protocol(cls: RawClass, protocol: RawProtocol) -> bool {
    // SAFETY: caller contract
    let (Some(cls), Some(protocol)) = (unsafe { class_ref(cls) }, unsafe { protocol_ref(protocol) })
    else {
        return false;
    };
    let Ok(mut adopted) = cls.protocols.write() else {
        return false;
    };
    if adopted.iter().any(|p| std::ptr::eq(*p, protocol)) {
        return false;
    }
    adopted.push(protocol);
    true
}

/// True if `cls` or a superclass adopts a protocol conforming to `protocol`.
///
/// # Safety
///
/// `cls` must be null or a class and `protocol` null or a protocol of this runtime.
pub unsafe extern "C" fn class_conforms_to_protocol(cls: RawClass, protocol: RawProtocol) -> bool {
    // SAFETY: caller contract
    let (Some(cls), Some(protocol)) = (unsafe { class_ref(cls) }, unsafe { protocol_ref(protocol) })
    else {
        return false;
    };
    cls.chain().any(|c| {
        c.protocols
            .read()
            .is_ok_and(|adopted| adopted.iter().any(|p| p.conforms_to(protocol)))
    })
}

/// Returns a `malloc`'d array of the protocols adopted directly by `cls`.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `out_count` null or writable.
pub unsafe extern "C" fn class_copy_protocol_list(cls: RawClass, out_count: *mut c_uint) -> *mut RawProtocol {
    // SAFETY: caller contract
    let list: Vec<RawProtocol> = unsafe { class_ref(cls) }
        .and_then(|c| c.protocols.read().ok().map(|p| p.iter().map(|p| p.as_raw()).collect()))
        .unwrap_or_default();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&list, out_count) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector;

    #[test]
    fn test_protocol_lifecycle() {
        unsafe {
            let base = objc_allocate_protocol(c"ProtocolTestBase".as_ptr());
            assert!(!base.is_null());
            assert!(objc_allocate_protocol(c"ProtocolTestBase".as_ptr()).is_null());
            assert!(objc_get_protocol(c"ProtocolTestBase".as_ptr()).is_null());

            protocol_add_method_description(base, selector::intern("copy"), c"@@:".as_ptr(), true, true);
            protocol_add_method_description(base, selector::intern("zone"), c"^v@:".as_ptr(), false, true);
            objc_register_protocol(base);
            assert_eq!(objc_get_protocol(c"ProtocolTestBase".as_ptr()), base);

            let mut count = 0;
            let list = protocol_copy_method_description_list(base, true, true, &mut count);
            assert_eq!(count, 1);
            assert_eq!((*list).name, selector::intern("copy"));
            libc::free(list.cast());

            let derived = objc_allocate_protocol(c"ProtocolTestDerived".as_ptr());
            protocol_add_protocol(derived, base);
            objc_register_protocol(derived);
            assert!(protocol_conforms_to_protocol(derived, base));
            assert!(!protocol_conforms_to_protocol(base, derived));
        }
    }
}
