//! Message lookup and out-of-band exceptions.
//!
//! Dispatch is split the GNU way: `objc_msg_lookup` returns the IMP for a
//! receiver/selector pair and the caller invokes it with whatever signature
//! it resolved. A miss gives the class one chance to install the method via
//! `+resolveInstanceMethod:` / `+resolveClassMethod:`; if that fails the
//! lookup returns a forwarding IMP that raises an
//! `InvalidArgumentException`.
//!
//! Exceptions never unwind. `objc_exception_throw` parks the exception in a
//! thread-local slot and returns; whoever made the call picks it up with
//! `objc_exception_take`.

use crate::abi::{ObjcSuper, RawId, RawImp, RawSel};
use crate::class::{ClassInner, class_ref};
use crate::object::isa;
use crate::{root, selector};
use oxbridge_log::{debug, warn};
use std::cell::Cell;

thread_local! {
    static PENDING: Cell<usize> = const { Cell::new(0) };
}

type ResolveFn = unsafe extern "C" fn(RawId, RawSel, RawSel) -> bool;

unsafe extern "C" fn nil_method(_receiver: RawId, _cmd: RawSel) -> RawId {
    std::ptr::null_mut()
}

unsafe extern "C" fn forward_method(receiver: RawId, cmd: RawSel) -> RawId {
    // SAFETY: lookups only hand this IMP out for non-null receivers and
    // runtime selectors
    let (class_name, prefix) = unsafe {
        let cls = isa(receiver);
        if cls.meta { (cls.name().to_string(), '+') } else { (cls.name().to_string(), '-') }
    };
    // SAFETY: see above
    let sel = unsafe { selector::name_of(cmd) }.unwrap_or("?");
    let reason = format!("{prefix}[{class_name} {sel}]: unrecognized selector sent to instance {receiver:p}");
    warn!("{reason}");
    root::raise("InvalidArgumentException", &reason);
    std::ptr::null_mut()
}

fn as_imp(f: unsafe extern "C" fn(RawId, RawSel) -> RawId) -> RawImp {
    // SAFETY: IMPs are untyped code pointers; callers cast back to the real signature
    Some(unsafe { std::mem::transmute::<unsafe extern "C" fn(RawId, RawSel) -> RawId, unsafe extern "C" fn()>(f) })
}

/// Asks the receiver's class to install a method for `sel`.
fn resolve(cls: &'static ClassInner, receiver: RawId, sel: RawSel) -> bool {
    // instance miss: +[cls resolveInstanceMethod:]; class miss: +[receiver resolveClassMethod:]
    let (target, resolver_name) = if cls.meta {
        (receiver, "resolveClassMethod:")
    } else {
        (cls.as_raw(), "resolveInstanceMethod:")
    };
    let resolver_sel = selector::intern(resolver_name);
    if std::ptr::eq(sel, resolver_sel) {
        return false;
    }
    // SAFETY: target is a class of this runtime
    let meta = unsafe { isa(target) };
    let Some(imp) = meta.find_method(resolver_sel).and_then(|m| m.imp()) else {
        return false;
    };
    // SAFETY: resolver methods are registered with signature B@::
    let resolver = unsafe { std::mem::transmute::<unsafe extern "C" fn(), ResolveFn>(imp) };
    // SAFETY: see above
    let resolved = unsafe { resolver(target, resolver_sel, sel) };
    if resolved {
        debug!("{resolver_name} installed a method on {}", cls.name());
    }
    resolved
}

fn lookup_or_forward(cls: &'static ClassInner, receiver: RawId, sel: RawSel) -> RawImp {
    if let Some(imp) = cls.lookup_imp(sel) {
        return Some(imp);
    }
    if resolve(cls, receiver, sel) {
        if let Some(imp) = cls.lookup_imp(sel) {
            return Some(imp);
        }
    }
    as_imp(forward_method)
}

/// Returns the implementation `receiver` uses for `sel`.
///
/// Never returns the null IMP: nil receivers get a method that returns
/// zero, unknown selectors a forwarding method that raises.
///
/// # Safety
///
/// `receiver` must be null or an object of this runtime; `sel` a selector of
/// this runtime.
pub unsafe extern "C" fn objc_msg_lookup(receiver: RawId, sel: RawSel) -> RawImp {
    if receiver.is_null() || sel.is_null() {
        return as_imp(nil_method);
    }
    // SAFETY: caller contract
    let cls = unsafe { isa(receiver) };
    lookup_or_forward(cls, receiver, sel)
}

/// Looks up `sel` starting at `sup.super_class` instead of the receiver's class.
///
/// # Safety
///
/// `sup` must be null or point at a valid [`ObjcSuper`] whose fields are
/// runtime objects; `sel` must be a selector of this runtime.
pub unsafe extern "C" fn objc_msg_lookup_super(sup: *const ObjcSuper, sel: RawSel) -> RawImp {
    // SAFETY: caller contract
    let Some(sup) = (unsafe { sup.as_ref() }) else {
        return as_imp(nil_method);
    };
    if sup.receiver.is_null() || sel.is_null() {
        return as_imp(nil_method);
    }
    // SAFETY: caller contract
    let Some(start) = (unsafe { class_ref(sup.super_class) }) else {
        return as_imp(nil_method);
    };
    match start.lookup_imp(sel) {
        Some(imp) => Some(imp),
        None => as_imp(forward_method),
    }
}

/// Parks `exception` in the calling thread's pending slot.
///
/// A second throw before the first is taken replaces it.
pub extern "C" fn objc_exception_throw(exception: RawId) {
    PENDING.with(|slot| slot.set(exception as usize));
}

/// Returns and clears the calling thread's pending exception, or null.
pub extern "C" fn objc_exception_take() -> RawId {
    PENDING.with(|slot| slot.replace(0)) as RawId
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::imp_addr;
    use crate::class::{self, class_get_name};
    use crate::object::class_create_instance;
    use std::ffi::CStr;

    #[test]
    fn test_nil_receiver_gets_nil_method() {
        let imp = unsafe { objc_msg_lookup(std::ptr::null_mut(), selector::intern("anything")) };
        assert_eq!(imp_addr(imp), imp_addr(as_imp(nil_method)));
    }

    #[test]
    fn test_unknown_selector_raises() {
        root::ensure_installed();
        let object = class::lookup("Object").unwrap();
        let obj = unsafe { class_create_instance(object.as_raw(), 0) };
        let sel = selector::intern("messageTestNoSuchMethod");

        let imp = unsafe { objc_msg_lookup(obj, sel) }.unwrap();
        let call = unsafe {
            std::mem::transmute::<unsafe extern "C" fn(), unsafe extern "C" fn(RawId, RawSel) -> RawId>(imp)
        };
        assert!(unsafe { call(obj, sel) }.is_null());

        let exception = objc_exception_take();
        assert!(!exception.is_null());
        let class_name = unsafe { CStr::from_ptr(class_get_name(isa(exception).as_raw())) };
        assert_eq!(class_name.to_str().unwrap(), "Exception");
        assert!(objc_exception_take().is_null(), "take clears the slot");
    }
}
