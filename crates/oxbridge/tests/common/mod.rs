// Shared helpers for the bridge integration tests.
//
// Class names are process-wide in the runtime, so every fixture class gets
// a unique suffix.

#![allow(dead_code)]

use oxbridge::{Class, Config, FallbackPolicy, Id, PendingClass, RuntimeContext, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static CLASS_ID: AtomicUsize = AtomicUsize::new(0);

/// A name no other test has used, e.g. `Derived_7`.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", CLASS_ID.fetch_add(1, Ordering::SeqCst))
}

/// A fresh context over the builtin runtime.
pub fn context() -> RuntimeContext {
    RuntimeContext::builtin()
}

/// A fresh context with the given fallback policy.
pub fn context_with(fallback: FallbackPolicy) -> RuntimeContext {
    RuntimeContext::new(Config::new().with_fallback(fallback)).expect("builtin runtime")
}

pub fn root_class(ctx: &RuntimeContext) -> Class {
    ctx.class("Object").unwrap().expect("Object is installed")
}

/// Starts a subclass of `Object` with a unique name.
pub fn subclass(ctx: &RuntimeContext, prefix: &str) -> PendingClass {
    root_class(ctx).extend(ctx, &unique_name(prefix), 0).unwrap()
}

/// Sends `new` and unwraps the instance.
pub fn instance(ctx: &RuntimeContext, class: &Class) -> Id {
    ctx.msg_send(class, "new").unwrap().into_object().expect("new returned nil")
}

pub fn ok(value: impl Into<Value>) -> oxbridge::Result<Value> {
    Ok(value.into())
}

/// Registers a protocol with the builtin runtime.
///
/// Each method is `(selector, types, required, instance)`.
pub fn make_protocol(name: &str, methods: &[(&str, &str, bool, bool)]) {
    use std::ffi::CString;

    let c_name = CString::new(name).unwrap();
    unsafe {
        let protocol = oxbridge_rt::objc_allocate_protocol(c_name.as_ptr());
        assert!(!protocol.is_null(), "protocol {name} already exists");
        for &(selector, types, required, instance) in methods {
            let selector = CString::new(selector).unwrap();
            let types = CString::new(types).unwrap();
            let sel = oxbridge_rt::sel_register_name(selector.as_ptr());
            oxbridge_rt::protocol_add_method_description(protocol, sel, types.as_ptr(), required, instance);
        }
        oxbridge_rt::objc_register_protocol(protocol);
    }
}
