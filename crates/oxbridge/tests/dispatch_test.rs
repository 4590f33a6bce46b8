//! Message dispatch tests
//!
//! - Sends to instances and classes, nil receivers
//! - Keyword messages and typed arguments
//! - Superclass dispatch
//! - Fallback signatures and `+resolveInstanceMethod:`
//! - Native exceptions, host errors and panics
//! - Call frame caching
//!
//! Run with: `cargo test --test dispatch_test`

mod common;

use common::{context, context_with, instance, ok, root_class, subclass};
use oxbridge::runtime::RawMethod;
use oxbridge::{
    Class, Config, Dispatchable, Error, FallbackPolicy, Id, Message, RuntimeApi, RuntimeContext, StructValue, Value,
};
use std::ffi::c_char;

// ============================================================================
// Basic sends
// ============================================================================

#[test]
fn test_added_method_returns_bool() {
    let ctx = context();
    let mut derived = subclass(&ctx, "Derived");
    derived.add_method("flag", "B@:", |_, _, _| ok(true)).unwrap();
    let derived = derived.register().unwrap();

    let obj = instance(&ctx, &derived);
    assert_eq!(obj.invoke(&ctx, "flag").unwrap(), Value::Bool(true));
}

#[test]
fn test_alloc_init_returns_same_wrapper() {
    let ctx = context();
    let object = root_class(&ctx);
    let allocated = object.invoke(&ctx, "alloc").unwrap().into_object().unwrap();
    let initialized = allocated.invoke(&ctx, "init").unwrap();
    assert_eq!(initialized, Value::Object(allocated.clone()));
    assert!(Id::ptr_eq(initialized.as_object().unwrap(), &allocated));
}

#[test]
fn test_class_side_dispatch() {
    let ctx = context();
    let object = root_class(&ctx);
    let cls = object.invoke(&ctx, "class").unwrap();
    assert_eq!(cls.as_class(), Some(object.clone()));
    assert_eq!(object.invoke(&ctx, "version").unwrap(), Value::Int(0));
}

#[test]
fn test_nil_receiver_returns_nil() {
    let ctx = context();
    let nobody: Option<Id> = None;
    assert_eq!(nobody.invoke(&ctx, "anything").unwrap(), Value::Nil);
    assert_eq!(nobody.invoke(&ctx, [("with", 1), ("args", 2)]).unwrap(), Value::Nil);
    assert_eq!(nobody.invoke_super(&ctx, "init").unwrap(), Value::Nil);
}

#[test]
fn test_builtin_predicates() {
    let ctx = context();
    let object = root_class(&ctx);
    let obj = instance(&ctx, &object);

    assert_eq!(obj.invoke(&ctx, [("isKindOfClass", &object)]).unwrap(), Value::Bool(true));
    assert_eq!(obj.invoke(&ctx, [("isEqual", &obj)]).unwrap(), Value::Bool(true));
    assert_eq!(
        obj.invoke(&ctx, [("respondsToSelector", Value::Selector("hash".into()))]).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        obj.invoke(&ctx, [("respondsToSelector", Value::Selector("fly".into()))]).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(obj.invoke(&ctx, "hash").unwrap(), Value::UInt(obj.address() as u64));
}

#[test]
fn test_selector_argument_and_object_return() {
    let ctx = context();
    let obj = instance(&ctx, &root_class(&ctx));
    let result = obj
        .invoke(&ctx, [("performSelector", Value::Selector("self".into()))])
        .unwrap();
    assert_eq!(result, Value::Object(obj));
}

// ============================================================================
// Typed arguments
// ============================================================================

#[test]
fn test_keyword_message_with_integers() {
    let ctx = context();
    let mut calc = subclass(&ctx, "Calc");
    calc.add_method("add:to:", "q@:qq", |_, _, args| {
        ok(args[0].as_i64().unwrap() + args[1].as_i64().unwrap())
    })
    .unwrap();
    let calc = calc.register().unwrap();
    let obj = instance(&ctx, &calc);

    assert_eq!(obj.invoke(&ctx, [("add", 40), ("to", 2)]).unwrap(), Value::Int(42));
    let message = Message::with_args("add:to:", vec![Value::Int(-5), Value::Int(3)]);
    assert_eq!(obj.invoke(&ctx, message).unwrap(), Value::Int(-2));
}

#[test]
fn test_narrow_integer_and_float_returns() {
    let ctx = context();
    let mut numbers = subclass(&ctx, "Numbers");
    numbers.add_method("minusOne", "c@:", |_, _, _| ok(-1)).unwrap();
    numbers.add_method("bigShort", "S@:", |_, _, _| ok(65_000u32)).unwrap();
    numbers
        .add_method("scale:", "d@:d", |_, _, args| ok(args[0].as_f64().unwrap() * 2.0))
        .unwrap();
    numbers
        .add_method("half:", "f@:f", |_, _, args| ok(args[0].as_f64().unwrap() / 2.0))
        .unwrap();
    let numbers = numbers.register().unwrap();
    let obj = instance(&ctx, &numbers);

    assert_eq!(obj.invoke(&ctx, "minusOne").unwrap(), Value::Int(-1));
    assert_eq!(obj.invoke(&ctx, "bigShort").unwrap(), Value::UInt(65_000));
    assert_eq!(obj.invoke(&ctx, [("scale", 1.25)]).unwrap(), Value::Float(2.5));
    assert_eq!(obj.invoke(&ctx, [("half", 3.0)]).unwrap(), Value::Float(1.5));
}

#[test]
fn test_string_argument_and_return() {
    let ctx = context();
    let mut greeter = subclass(&ctx, "Greeter");
    greeter
        .add_method("greet:", "*@:*", |_, _, args| {
            ok(format!("hello, {}", args[0].as_str().unwrap()))
        })
        .unwrap();
    let greeter = greeter.register().unwrap();
    let obj = instance(&ctx, &greeter);

    assert_eq!(
        obj.invoke(&ctx, [("greet", "world")]).unwrap(),
        Value::Str("hello, world".into())
    );
}

#[test]
fn test_struct_by_value() {
    let ctx = context();
    let layout = ctx.register_struct("{Point=\"x\"d\"y\"d}").unwrap();
    let mut shapes = subclass(&ctx, "Shapes");
    shapes
        .add_method("shift:", "{Point=dd}@:{Point=dd}", |_, _, args| {
            let mut point = args[0].as_struct().unwrap().clone();
            let x = point.get("x").unwrap().as_f64().unwrap();
            point.set("x", x + 10.0);
            Ok(Value::Struct(point))
        })
        .unwrap();
    let shapes = shapes.register().unwrap();
    let obj = instance(&ctx, &shapes);

    let point = StructValue::new(layout, vec![Value::Float(1.5), Value::Float(2.5)]);
    let moved = obj.invoke(&ctx, [("shift", point)]).unwrap();
    let moved = moved.as_struct().unwrap();
    assert_eq!(moved.get("x"), Some(&Value::Float(11.5)));
    assert_eq!(moved.get("y"), Some(&Value::Float(2.5)));
}

#[test]
fn test_argument_count_mismatch() {
    let ctx = context();
    let obj = instance(&ctx, &root_class(&ctx));
    let err = obj.invoke(&ctx, Message::new("isEqual:")).unwrap_err();
    assert_eq!(
        err,
        Error::ArgumentCountMismatch {
            selector: "isEqual:".into(),
            expected: 1,
            got: 0,
        }
    );
}

#[test]
fn test_argument_type_mismatch() {
    let ctx = context();
    let mut calc = subclass(&ctx, "Typed");
    calc.add_method("square:", "q@:q", |_, _, args| ok(args[0].as_i64().unwrap().pow(2)))
        .unwrap();
    let calc = calc.register().unwrap();
    let obj = instance(&ctx, &calc);

    let err = obj.invoke(&ctx, [("square", "seven")]).unwrap_err();
    assert!(matches!(err, Error::ArgumentTypeMismatch { index: 0, found: "string", .. }));
}

// ============================================================================
// Superclass dispatch
// ============================================================================

#[test]
fn test_super_dispatch() {
    let ctx = context();
    let mut base = subclass(&ctx, "Base");
    base.add_method("describe", "*@:", |_, _, _| ok("base")).unwrap();
    let base = base.register().unwrap();

    let mut derived = base.extend(&ctx, &common::unique_name("Child"), 0).unwrap();
    let derived_class = derived.class().clone();
    derived
        .add_method("describe", "*@:", move |ctx, this, _| {
            let inherited = ctx.msg_send_super_of(this, &derived_class, "describe")?;
            ok(format!("child of {}", inherited.as_str().unwrap_or("?")))
        })
        .unwrap();
    let derived = derived.register().unwrap();
    let obj = instance(&ctx, &derived);

    assert_eq!(obj.invoke(&ctx, "describe").unwrap(), Value::Str("child of base".into()));
    assert_eq!(obj.invoke_super(&ctx, "describe").unwrap(), Value::Str("base".into()));
}

#[test]
fn test_super_dispatch_from_root_is_unrecognized() {
    let ctx = context();
    let object = root_class(&ctx);
    let obj = instance(&ctx, &object);
    let err = ctx.msg_send_super(&obj, "init").unwrap_err();
    assert_eq!(err, Error::UnrecognizedSelector { selector: "init".into() });
}

// ============================================================================
// Fallback and resolution
// ============================================================================

#[test]
fn test_unknown_selector_raises_native_exception() {
    let ctx = context();
    let obj = instance(&ctx, &root_class(&ctx));
    match obj.invoke(&ctx, "fly").unwrap_err() {
        Error::Exception { exception, name, reason } => {
            assert_eq!(name.as_deref(), Some("InvalidArgumentException"));
            assert!(reason.unwrap().contains("fly"));
            assert_eq!(exception.class_name(&ctx), "Exception");
        }
        other => panic!("expected an exception, got {other:?}"),
    }
}

#[test]
fn test_deny_policy_rejects_unknown_selectors() {
    let ctx = context_with(FallbackPolicy::Deny);
    let obj = instance(&ctx, &root_class(&ctx));
    assert_eq!(
        obj.invoke(&ctx, "fly").unwrap_err(),
        Error::UnrecognizedSelector { selector: "fly".into() }
    );
    // known selectors are unaffected
    assert_eq!(obj.invoke(&ctx, "self").unwrap(), Value::Object(obj));
}

#[test]
fn test_resolve_instance_method_installs_method() {
    let ctx = context_with(FallbackPolicy::Assume);
    let mut lazy = subclass(&ctx, "Lazy");
    lazy.add_class_method("resolveInstanceMethod:", "B@::", |ctx, this, args| {
        if args[0].as_str() != Some("mystery") {
            return ok(false);
        }
        let cls = Class::try_from(this.clone()).expect("resolver runs on the class");
        cls.add_method(ctx, "mystery", "@@:", |_, this, _| Ok(Value::Object(this.clone())))?;
        ok(true)
    })
    .unwrap();
    let lazy = lazy.register().unwrap();
    let obj = instance(&ctx, &lazy);

    assert!(lazy.instance_method(&ctx, "mystery").unwrap().is_none());
    assert_eq!(obj.invoke(&ctx, "mystery").unwrap(), Value::Object(obj.clone()));
    assert!(lazy.instance_method(&ctx, "mystery").unwrap().is_some());
    assert!(matches!(obj.invoke(&ctx, "other").unwrap_err(), Error::Exception { .. }));
}

// ============================================================================
// Exceptions and host failures
// ============================================================================

#[test]
fn test_raised_exception_carries_name_and_reason() {
    let ctx = context();
    let exception_class = ctx.class("Exception").unwrap().unwrap();
    let exception = exception_class
        .invoke(&ctx, [("exceptionWithName", "Oops"), ("reason", "bad things")])
        .unwrap()
        .into_object()
        .unwrap();

    match exception.invoke(&ctx, "raise").unwrap_err() {
        Error::Exception { exception: thrown, name, reason } => {
            assert_eq!(thrown, exception);
            assert_eq!(name.as_deref(), Some("Oops"));
            assert_eq!(reason.as_deref(), Some("bad things"));
        }
        other => panic!("expected an exception, got {other:?}"),
    }
    // the exception was consumed
    assert_eq!(exception.invoke(&ctx, "name").unwrap(), Value::Str("Oops".into()));
}

#[test]
fn test_host_error_propagates_through_native_call() {
    let ctx = context();
    let mut failing = subclass(&ctx, "Failing");
    failing
        .add_method("explode", "v@:", |_, _, _| Err(Error::IvarNotFound { name: "fuse".into() }))
        .unwrap();
    let failing = failing.register().unwrap();
    let obj = instance(&ctx, &failing);

    assert_eq!(obj.invoke(&ctx, "explode").unwrap_err(), Error::IvarNotFound { name: "fuse".into() });
    // the pending error does not leak into the next call
    assert_eq!(obj.invoke(&ctx, "self").unwrap(), Value::Object(obj));
}

#[test]
fn test_panic_in_method_body_is_caught() {
    let ctx = context();
    let mut fragile = subclass(&ctx, "Fragile");
    fragile.add_method("crash", "q@:", |_, _, _| panic!("kaboom")).unwrap();
    let fragile = fragile.register().unwrap();
    let obj = instance(&ctx, &fragile);

    assert_eq!(
        obj.invoke(&ctx, "crash").unwrap_err(),
        Error::Callback {
            selector: "crash".into(),
            reason: "kaboom".into(),
        }
    );
}

#[test]
fn test_nested_dispatch_from_method_body() {
    let ctx = context();
    let mut outer = subclass(&ctx, "Outer");
    outer.add_method("inner", "q@:", |_, _, _| ok(20)).unwrap();
    outer
        .add_method("outer", "q@:", |ctx, this, _| {
            let inner = ctx.msg_send(this, "inner")?.as_i64().unwrap();
            ok(inner + 1)
        })
        .unwrap();
    let outer = outer.register().unwrap();
    let obj = instance(&ctx, &outer);

    assert_eq!(obj.invoke(&ctx, "outer").unwrap(), Value::Int(21));
}

#[test]
fn test_call_frames_are_shared_by_shape() {
    let ctx = context();
    let object = root_class(&ctx);
    let a = instance(&ctx, &object);
    let b = instance(&ctx, &object);

    a.invoke(&ctx, "self").unwrap();
    let frames = ctx.cached_frames();
    b.invoke(&ctx, "init").unwrap();
    a.invoke(&ctx, "self").unwrap();
    assert_eq!(ctx.cached_frames(), frames);
}

unsafe extern "C" fn no_type_encoding(_method: RawMethod) -> *const c_char {
    std::ptr::null()
}

#[test]
fn test_methods_without_type_strings_get_their_own_frames() {
    let api = RuntimeApi {
        method_get_type_encoding: no_type_encoding,
        ..RuntimeApi::builtin()
    };
    let ctx = RuntimeContext::with_api(api, Config::default());
    let mut pending = subclass(&ctx, "Untyped");
    pending
        .add_method("answer", "q@:", |_, _, _| ok(42i64))
        .unwrap()
        .add_method("double:", "q@:q", |_, _, args| ok(args[0].as_i64().unwrap() * 2))
        .unwrap();
    let untyped = pending.register().unwrap();
    let obj = instance(&ctx, &untyped);

    assert_eq!(obj.invoke(&ctx, "answer").unwrap(), Value::Int(42));
    let frames = ctx.cached_frames();
    assert_eq!(obj.invoke(&ctx, [("double", 21i64)]).unwrap(), Value::Int(42));
    assert_eq!(ctx.cached_frames(), frames + 1);
    assert_eq!(obj.invoke(&ctx, "answer").unwrap(), Value::Int(42));
    assert_eq!(ctx.cached_frames(), frames + 1);
}
