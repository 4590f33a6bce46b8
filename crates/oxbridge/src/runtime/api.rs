//! The native runtime surface as a table of function pointers.
//!
//! Everything the bridge does to the object runtime goes through a
//! [`RuntimeApi`]. The table is filled either from the bundled runtime
//! ([`RuntimeApi::builtin`]) or from symbols of a shared library such as
//! GNUstep's `libobjc2` ([`RuntimeApi::from_library`]). Fields are public so
//! embedders and tests can interpose individual entry points.

use super::library::NativeLibrary;
use crate::error::Result;
use std::ffi::{c_char, c_int, c_uint, c_void};

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

/// One entry of a protocol's method description list.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MethodDescription {
    /// Selector of the described method
    pub name: RawSel,
    /// Type encoding of the described method
    pub types: *const c_char,
}

/// Association policy that stores the raw pointer without retaining it.
pub const ASSOCIATION_ASSIGN: usize = 0;

/// Function table over a native object runtime.
///
/// Buffers returned by the `copy_*` entries are runtime-owned and must be
/// released exactly once through [`RuntimeApi::free`].
#[allow(missing_docs)]
#[derive(Clone, Copy)]
pub struct RuntimeApi {
    pub get_class: unsafe extern "C" fn(*const c_char) -> RawClass,
    pub get_class_list: unsafe extern "C" fn(*mut RawClass, c_int) -> c_int,
    pub copy_class_list: unsafe extern "C" fn(*mut c_uint) -> *mut RawClass,
    pub allocate_class_pair: unsafe extern "C" fn(RawClass, *const c_char, usize) -> RawClass,
    pub register_class_pair: unsafe extern "C" fn(RawClass),

    pub class_get_name: unsafe extern "C" fn(RawClass) -> *const c_char,
    pub class_get_superclass: unsafe extern "C" fn(RawClass) -> RawClass,
    pub class_set_superclass: unsafe extern "C" fn(RawClass, RawClass) -> RawClass,
    pub class_is_meta_class: unsafe extern "C" fn(RawClass) -> bool,
    pub class_get_instance_size: unsafe extern "C" fn(RawClass) -> usize,
    pub class_get_version: unsafe extern "C" fn(RawClass) -> c_int,
    pub class_set_version: unsafe extern "C" fn(RawClass, c_int),
    pub class_add_method: unsafe extern "C" fn(RawClass, RawSel, RawImp, *const c_char) -> bool,
    pub class_replace_method: unsafe extern "C" fn(RawClass, RawSel, RawImp, *const c_char) -> RawImp,
    pub class_add_ivar: unsafe extern "C" fn(RawClass, *const c_char, usize, u8, *const c_char) -> bool,
    pub class_add_protocol: unsafe extern "C" fn(RawClass, RawProtocol) -> bool,
    pub class_conforms_to_protocol: unsafe extern "C" fn(RawClass, RawProtocol) -> bool,
    pub class_copy_method_list: unsafe extern "C" fn(RawClass, *mut c_uint) -> *mut RawMethod,
    pub class_copy_ivar_list: unsafe extern "C" fn(RawClass, *mut c_uint) -> *mut RawIvar,
    pub class_copy_protocol_list: unsafe extern "C" fn(RawClass, *mut c_uint) -> *mut RawProtocol,
    pub class_get_instance_method: unsafe extern "C" fn(RawClass, RawSel) -> RawMethod,
    pub class_get_class_method: unsafe extern "C" fn(RawClass, RawSel) -> RawMethod,
    pub class_get_instance_variable: unsafe extern "C" fn(RawClass, *const c_char) -> RawIvar,
    pub class_get_class_variable: unsafe extern "C" fn(RawClass, *const c_char) -> RawIvar,
    pub class_get_ivar_layout: unsafe extern "C" fn(RawClass) -> *const u8,
    pub class_set_ivar_layout: unsafe extern "C" fn(RawClass, *const u8),
    pub class_get_weak_ivar_layout: unsafe extern "C" fn(RawClass) -> *const u8,
    pub class_set_weak_ivar_layout: unsafe extern "C" fn(RawClass, *const u8),
    pub class_responds_to_selector: unsafe extern "C" fn(RawClass, RawSel) -> bool,
    pub class_create_instance: unsafe extern "C" fn(RawClass, usize) -> RawId,

    pub method_get_name: unsafe extern "C" fn(RawMethod) -> RawSel,
    pub method_get_implementation: unsafe extern "C" fn(RawMethod) -> RawImp,
    pub method_set_implementation: unsafe extern "C" fn(RawMethod, RawImp) -> RawImp,
    pub method_exchange_implementations: unsafe extern "C" fn(RawMethod, RawMethod),
    pub method_get_type_encoding: unsafe extern "C" fn(RawMethod) -> *const c_char,
    pub method_get_number_of_arguments: unsafe extern "C" fn(RawMethod) -> c_uint,
    pub method_copy_return_type: unsafe extern "C" fn(RawMethod) -> *mut c_char,
    pub method_copy_argument_type: unsafe extern "C" fn(RawMethod, c_uint) -> *mut c_char,

    pub ivar_get_name: unsafe extern "C" fn(RawIvar) -> *const c_char,
    pub ivar_get_offset: unsafe extern "C" fn(RawIvar) -> isize,
    pub ivar_get_type_encoding: unsafe extern "C" fn(RawIvar) -> *const c_char,

    pub object_get_class: unsafe extern "C" fn(RawId) -> RawClass,
    pub object_set_class: unsafe extern "C" fn(RawId, RawClass) -> RawClass,
    pub object_get_class_name: unsafe extern "C" fn(RawId) -> *const c_char,

    pub get_protocol: unsafe extern "C" fn(*const c_char) -> RawProtocol,
    pub copy_protocol_list: unsafe extern "C" fn(*mut c_uint) -> *mut RawProtocol,
    pub protocol_get_name: unsafe extern "C" fn(RawProtocol) -> *const c_char,
    pub protocol_conforms_to_protocol: unsafe extern "C" fn(RawProtocol, RawProtocol) -> bool,
    pub protocol_copy_method_description_list:
        unsafe extern "C" fn(RawProtocol, bool, bool, *mut c_uint) -> *mut MethodDescription,

    pub sel_register_name: unsafe extern "C" fn(*const c_char) -> RawSel,
    pub sel_get_name: unsafe extern "C" fn(RawSel) -> *const c_char,

    pub set_associated_object: unsafe extern "C" fn(RawId, *const c_void, RawId, usize),
    pub get_associated_object: unsafe extern "C" fn(RawId, *const c_void) -> RawId,

    pub msg_lookup: unsafe extern "C" fn(RawId, RawSel) -> RawImp,
    pub msg_lookup_super: unsafe extern "C" fn(*const ObjcSuper, RawSel) -> RawImp,
    /// Takes the exception raised by the last call, if the runtime reports
    /// exceptions out of band.
    pub exception_take: Option<unsafe extern "C" fn() -> RawId>,

    /// Releases buffers returned by `copy_*` entries.
    pub free: unsafe extern "C" fn(*mut c_void),
}

impl std::fmt::Debug for RuntimeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeApi")
            .field("get_class", &(self.get_class as *const c_void))
            .field("msg_lookup", &(self.msg_lookup as *const c_void))
            .field("out_of_band_exceptions", &self.exception_take.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "builtin-runtime")]
mod builtin {
    use super::{MethodDescription, ObjcSuper, RawImp, RawProtocol, RawSel};
    use std::ffi::c_uint;

    pub(super) unsafe extern "C" fn protocol_methods(
        protocol: RawProtocol,
        required: bool,
        instance: bool,
        out_count: *mut c_uint,
    ) -> *mut MethodDescription {
        // SAFETY: both description structs are repr(C) with identical fields
        unsafe {
            oxbridge_rt::protocol_copy_method_description_list(protocol, required, instance, out_count).cast()
        }
    }

    pub(super) unsafe extern "C" fn lookup_super(sup: *const ObjcSuper, sel: RawSel) -> RawImp {
        // SAFETY: both super structs are repr(C) with identical fields
        unsafe { oxbridge_rt::objc_msg_lookup_super(sup.cast(), sel) }
    }
}

impl RuntimeApi {
    /// The bundled `oxbridge-rt` runtime.
    #[cfg(feature = "builtin-runtime")]
    pub fn builtin() -> Self {
        use oxbridge_rt as rt;

        RuntimeApi {
            get_class: rt::objc_get_class,
            get_class_list: rt::objc_get_class_list,
            copy_class_list: rt::objc_copy_class_list,
            allocate_class_pair: rt::objc_allocate_class_pair,
            register_class_pair: rt::objc_register_class_pair,
            class_get_name: rt::class_get_name,
            class_get_superclass: rt::class_get_superclass,
            class_set_superclass: rt::class_set_superclass,
            class_is_meta_class: rt::class_is_meta_class,
            class_get_instance_size: rt::class_get_instance_size,
            class_get_version: rt::class_get_version,
            class_set_version: rt::class_set_version,
            class_add_method: rt::class_add_method,
            class_replace_method: rt::class_replace_method,
            class_add_ivar: rt::class_add_ivar,
            class_add_protocol: rt::class_add_protocol,
            class_conforms_to_protocol: rt::class_conforms_to_protocol,
            class_copy_method_list: rt::class_copy_method_list,
            class_copy_ivar_list: rt::class_copy_ivar_list,
            class_copy_protocol_list: rt::class_copy_protocol_list,
            class_get_instance_method: rt::class_get_instance_method,
            class_get_class_method: rt::class_get_class_method,
            class_get_instance_variable: rt::class_get_instance_variable,
            class_get_class_variable: rt::class_get_class_variable,
            class_get_ivar_layout: rt::class_get_ivar_layout,
            class_set_ivar_layout: rt::class_set_ivar_layout,
            class_get_weak_ivar_layout: rt::class_get_weak_ivar_layout,
            class_set_weak_ivar_layout: rt::class_set_weak_ivar_layout,
            class_responds_to_selector: rt::class_responds_to_selector,
            class_create_instance: rt::class_create_instance,
            method_get_name: rt::method_get_name,
            method_get_implementation: rt::method_get_implementation,
            method_set_implementation: rt::method_set_implementation,
            method_exchange_implementations: rt::method_exchange_implementations,
            method_get_type_encoding: rt::method_get_type_encoding,
            method_get_number_of_arguments: rt::method_get_number_of_arguments,
            method_copy_return_type: rt::method_copy_return_type,
            method_copy_argument_type: rt::method_copy_argument_type,
            ivar_get_name: rt::ivar_get_name,
            ivar_get_offset: rt::ivar_get_offset,
            ivar_get_type_encoding: rt::ivar_get_type_encoding,
            object_get_class: rt::object_get_class,
            object_set_class: rt::object_set_class,
            object_get_class_name: rt::object_get_class_name,
            get_protocol: rt::objc_get_protocol,
            copy_protocol_list: rt::objc_copy_protocol_list,
            protocol_get_name: rt::protocol_get_name,
            protocol_conforms_to_protocol: rt::protocol_conforms_to_protocol,
            protocol_copy_method_description_list: builtin::protocol_methods,
            sel_register_name: rt::sel_register_name,
            sel_get_name: rt::sel_get_name,
            set_associated_object: rt::objc_set_associated_object,
            get_associated_object: rt::objc_get_associated_object,
            msg_lookup: rt::objc_msg_lookup,
            msg_lookup_super: builtin::lookup_super,
            exception_take: Some(rt::objc_exception_take as unsafe extern "C" fn() -> RawId),
            free: rt::runtime_free,
        }
    }

    /// Resolves every entry from a GNU-ABI runtime library (`libobjc2`).
    ///
    /// Exceptions unwind through such runtimes instead of being reported
    /// out of band, so `exception_take` stays empty unless the library
    /// exports `objc_exception_take`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`](crate::Error::SymbolNotFound) for the
    /// first missing entry point.
    ///
    /// # Safety
    ///
    /// The library must implement each symbol with the C signature of the
    /// matching field.
    pub unsafe fn from_library(lib: &NativeLibrary) -> Result<Self> {
        // SAFETY: caller contract; the library is never unloaded
        unsafe {
            Ok(RuntimeApi {
                get_class: lib.function("objc_getClass")?,
                get_class_list: lib.function("objc_getClassList")?,
                copy_class_list: lib.function("objc_copyClassList")?,
                allocate_class_pair: lib.function("objc_allocateClassPair")?,
                register_class_pair: lib.function("objc_registerClassPair")?,
                class_get_name: lib.function("class_getName")?,
                class_get_superclass: lib.function("class_getSuperclass")?,
                class_set_superclass: lib.function("class_setSuperclass")?,
                class_is_meta_class: lib.function("class_isMetaClass")?,
                class_get_instance_size: lib.function("class_getInstanceSize")?,
                class_get_version: lib.function("class_getVersion")?,
                class_set_version: lib.function("class_setVersion")?,
                class_add_method: lib.function("class_addMethod")?,
                class_replace_method: lib.function("class_replaceMethod")?,
                class_add_ivar: lib.function("class_addIvar")?,
                class_add_protocol: lib.function("class_addProtocol")?,
                class_conforms_to_protocol: lib.function("class_conformsToProtocol")?,
                class_copy_method_list: lib.function("class_copyMethodList")?,
                class_copy_ivar_list: lib.function("class_copyIvarList")?,
                class_copy_protocol_list: lib.function("class_copyProtocolList")?,
                class_get_instance_method: lib.function("class_getInstanceMethod")?,
                class_get_class_method: lib.function("class_getClassMethod")?,
                class_get_instance_variable: lib.function("class_getInstanceVariable")?,
                class_get_class_variable: lib.function("class_getClassVariable")?,
                class_get_ivar_layout: lib.function("class_getIvarLayout")?,
                class_set_ivar_layout: lib.function("class_setIvarLayout")?,
                class_get_weak_ivar_layout: lib.function("class_getWeakIvarLayout")?,
                class_set_weak_ivar_layout: lib.function("class_setWeakIvarLayout")?,
                class_responds_to_selector: lib.function("class_respondsToSelector")?,
                class_create_instance: lib.function("class_createInstance")?,
                method_get_name: lib.function("method_getName")?,
                method_get_implementation: lib.function("method_getImplementation")?,
                method_set_implementation: lib.function("method_setImplementation")?,
                method_exchange_implementations: lib.function("method_exchangeImplementations")?,
                method_get_type_encoding: lib.function("method_getTypeEncoding")?,
                method_get_number_of_arguments: lib.function("method_getNumberOfArguments")?,
                method_copy_return_type: lib.function("method_copyReturnType")?,
                method_copy_argument_type: lib.function("method_copyArgumentType")?,
                ivar_get_name: lib.function("ivar_getName")?,
                ivar_get_offset: lib.function("ivar_getOffset")?,
                ivar_get_type_encoding: lib.function("ivar_getTypeEncoding")?,
                object_get_class: lib.function("object_getClass")?,
                object_set_class: lib.function("object_setClass")?,
                object_get_class_name: lib.function("object_getClassName")?,
                get_protocol: lib.function("objc_getProtocol")?,
                copy_protocol_list: lib.function("objc_copyProtocolList")?,
                protocol_get_name: lib.function("protocol_getName")?,
                protocol_conforms_to_protocol: lib.function("protocol_conformsToProtocol")?,
                protocol_copy_method_description_list: lib.function("protocol_copyMethodDescriptionList")?,
                sel_register_name: lib.function("sel_registerName")?,
                sel_get_name: lib.function("sel_getName")?,
                set_associated_object: lib.function("objc_setAssociatedObject")?,
                get_associated_object: lib.function("objc_getAssociatedObject")?,
                msg_lookup: lib.function("objc_msg_lookup")?,
                msg_lookup_super: lib.function("objc_msg_lookup_super")?,
                exception_take: lib.function("objc_exception_take").ok(),
                free: libc::free,
            })
        }
    }
}
