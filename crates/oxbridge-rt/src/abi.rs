//! C-level types shared by every exported runtime function.
//!
//! All handles cross the boundary as untyped pointers. Internally they point
//! at [`ClassInner`](crate::class), [`SelInner`](crate::selector) and friends,
//! but callers only ever see the addresses.

use std::ffi::{c_char, c_void};

/// An object reference (`id`).
pub type RawId = *mut c_void;
/// A class or metaclass reference (`Class`).
pub type RawClass = *mut c_void;
/// An interned selector (`SEL`).
pub type RawSel = *const c_void;
/// A method descriptor (`Method`).
pub type RawMethod = *mut c_void;
/// An instance variable descriptor (`Ivar`).
pub type RawIvar = *mut c_void;
/// A protocol descriptor (`Protocol *`).
pub type RawProtocol = *mut c_void;
/// A method implementation. `None` is the null IMP.
pub type RawImp = Option<unsafe extern "C" fn()>;

/// Receiver and starting class for a superclass message lookup.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ObjcSuper {
    /// The object receiving the message
    pub receiver: RawId,
    /// The class whose method table the lookup starts at
    pub super_class: RawClass,
}

/// One entry returned by `protocol_copy_method_description_list`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MethodDescription {
    /// Selector of the described method
    pub name: RawSel,
    /// Type encoding of the described method
    pub types: *const c_char,
}

/// Association policy: store the raw pointer without retaining it.
pub const ASSOCIATION_ASSIGN: usize = 0;
/// Association policy: retain the associated object (non-atomically).
pub const ASSOCIATION_RETAIN_NONATOMIC: usize = 1;

/// Converts a stored implementation address back into an IMP.
pub(crate) fn imp_from_addr(addr: usize) -> RawImp {
    if addr == 0 {
        None
    } else {
        // SAFETY: non-zero addresses stored by this crate always came from an
        // `unsafe extern "C" fn()` pointer
        Some(unsafe { std::mem::transmute::<usize, unsafe extern "C" fn()>(addr) })
    }
}

/// Converts an IMP into its address, 0 for the null IMP.
pub(crate) fn imp_addr(imp: RawImp) -> usize {
    imp.map_or(0, |f| f as usize)
}
