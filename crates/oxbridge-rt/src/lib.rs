//! A self-contained Objective-C style object runtime with a C ABI.
//!
//! `oxbridge-rt` implements the runtime surface a dynamic bridge consumes:
//! interned selectors, class pairs built at runtime, method and ivar
//! tables, protocols, associated storage, message lookup and an out-of-band
//! exception slot. Every entry point is an `unsafe extern "C" fn` over raw
//! pointers (see [`abi`]), so a caller can hold them in a function table next
//! to the same symbols resolved from a system `libobjc`.
//!
//! Two classes exist from the start: the root class `Object` and
//! `Exception`. Both are installed lazily by the first class or protocol
//! lookup.
//!
//! Lists returned by `*_copy_*` functions are allocated with `malloc`; free
//! them with [`runtime_free`] (or `free`).
//!
//! # Example
//!
//! ```
//! use oxbridge_rt::*;
//!
//! unsafe {
//!     let object = objc_get_class(c"Object".as_ptr());
//!     let counter = objc_allocate_class_pair(object, c"DocCounter".as_ptr(), 0);
//!     assert!(class_add_ivar(counter, c"count".as_ptr(), 8, 3, c"q".as_ptr()));
//!     objc_register_class_pair(counter);
//!
//!     assert_eq!(objc_get_class(c"DocCounter".as_ptr()), counter);
//!     assert_eq!(class_get_superclass(counter), object);
//! }
//! ```

pub mod abi;
mod assoc;
mod class;
mod encoding;
mod memory;
mod message;
mod method;
mod object;
mod protocol;
mod root;
mod selector;

pub use abi::*;
pub use assoc::{objc_get_associated_object, objc_remove_associated_objects, objc_set_associated_object};
pub use class::{
    class_add_ivar, class_add_method, class_copy_ivar_list, class_copy_method_list, class_get_class_method,
    class_get_class_variable, class_get_instance_method, class_get_instance_size, class_get_instance_variable,
    class_get_ivar_layout, class_get_name, class_get_superclass, class_get_version, class_get_weak_ivar_layout,
    class_is_meta_class, class_replace_method, class_responds_to_selector, class_set_ivar_layout,
    class_set_superclass, class_set_version, class_set_weak_ivar_layout, objc_allocate_class_pair,
    objc_copy_class_list, objc_get_class, objc_get_class_list, objc_register_class_pair,
};
pub use memory::runtime_free;
pub use message::{objc_exception_take, objc_exception_throw, objc_msg_lookup, objc_msg_lookup_super};
pub use method::{
    ivar_get_name, ivar_get_offset, ivar_get_type_encoding, method_copy_argument_type, method_copy_return_type,
    method_exchange_implementations, method_get_implementation, method_get_name, method_get_number_of_arguments,
    method_get_type_encoding, method_set_implementation,
};
pub use object::{
    class_create_instance, object_dispose, object_get_class, object_get_class_name, object_get_indexed_ivars,
    object_is_class, object_set_class,
};
pub use protocol::{
    class_add_protocol, class_conforms_to_protocol, class_copy_protocol_list, objc_allocate_protocol,
    objc_copy_protocol_list, objc_get_protocol, objc_register_protocol, protocol_add_method_description,
    protocol_add_protocol, protocol_conforms_to_protocol, protocol_copy_method_description_list, protocol_get_name,
};
pub use selector::{sel_get_name, sel_is_equal, sel_register_name};
