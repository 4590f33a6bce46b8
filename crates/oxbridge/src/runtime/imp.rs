//! Native entry points for host method bodies.
//!
//! Each added method gets a libffi closure whose code pointer is handed to
//! the runtime as the IMP. The closure decodes the native arguments, runs
//! the body, and encodes its result back into the return slot.

use super::api::{RawId, RawImp};
use super::call::build_cif;
use super::context::{ContextInner, RuntimeContext};
use super::encoding::{Primitive, Signature};
use super::marshal::{self, Scratch};
use super::object::Id;
use super::value::Value;
use crate::error::{Error, Result};
use libffi::low;
use libffi::middle::Closure;
use oxbridge_log::{error, warn};
use std::any::Any;
use std::ffi::c_void;
use std::mem::size_of;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Weak;

/// A host method body: receives the receiver and the declared arguments.
pub(crate) type MethodBody = Box<dyn Fn(&RuntimeContext, &Id, &[Value]) -> Result<Value>>;

struct ImpData {
    ctx: Weak<ContextInner>,
    selector: String,
    signature: Signature,
    body: MethodBody,
}

/// Creates a native IMP running `body` with the shape of `signature`.
///
/// The closure and its data are leaked: the runtime may call the IMP for
/// the rest of the process.
pub(crate) fn make_imp(ctx: &RuntimeContext, selector: &str, signature: Signature, body: MethodBody) -> Result<RawImp> {
    if !signature.is_method() {
        return Err(Error::InvalidSignature {
            signature: signature.encoding(),
        });
    }
    let data: &'static ImpData = Box::leak(Box::new(ImpData {
        ctx: ctx.downgrade(),
        selector: selector.to_string(),
        signature,
        body,
    }));
    let closure = Closure::new(build_cif(&data.signature), trampoline, data);
    let code = *closure.code_ptr();
    std::mem::forget(closure);
    Ok(Some(code))
}

unsafe extern "C" fn trampoline(_cif: &low::ffi_cif, result: &mut u64, args: *const *const c_void, data: &ImpData) {
    let ret = data.signature.return_type();
    let out = std::ptr::from_mut(result).cast::<u8>();
    let width = ret.size().max(size_of::<usize>());
    // SAFETY: libffi sizes the return slot for the return type, at least a register
    let out = unsafe {
        std::ptr::write_bytes(out, 0, width);
        std::slice::from_raw_parts_mut(out, width)
    };

    let Some(ctx) = RuntimeContext::upgrade(&data.ctx) else {
        error!("-{} called after its runtime context was dropped", data.selector);
        return;
    };

    // SAFETY: args holds one pointer per argument of the signature
    let outcome = catch_unwind(AssertUnwindSafe(|| unsafe { respond(&ctx, data, args, out) }));
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(payload) => Error::Callback {
            selector: data.selector.clone(),
            reason: panic_message(payload.as_ref()),
        },
    };
    warn!("-{} failed: {failure}", data.selector);
    out.fill(0);
    ctx.set_pending_error(failure);
}

unsafe fn respond(ctx: &RuntimeContext, data: &ImpData, args: *const *const c_void, out: &mut [u8]) -> Result<()> {
    // SAFETY: argument 0 is the receiver
    let receiver = unsafe { (*args).cast::<RawId>().read() };
    let receiver = ctx.wrap(receiver).ok_or_else(|| Error::Callback {
        selector: data.selector.clone(),
        reason: "nil receiver".into(),
    })?;

    let declared = data.signature.declared_arguments();
    let mut values = Vec::with_capacity(declared.len());
    for (i, descriptor) in declared.iter().enumerate() {
        // SAFETY: declared arguments follow the receiver and selector
        let bytes = unsafe { std::slice::from_raw_parts((*args.add(i + 2)).cast::<u8>(), descriptor.size()) };
        // SAFETY: the caller passed values of the declared types
        values.push(unsafe { marshal::decode(ctx, descriptor, bytes) }?);
    }

    let value = (data.body)(ctx, &receiver, &values)?;

    let ret = data.signature.return_type();
    match ret.primitive_kind() {
        Some(Primitive::Void) => {}
        Some(p) if marshal::is_widened(p) => {
            let mut narrow = [0u8; 8];
            if !marshal::encode_primitive(p, &value, &mut narrow) {
                return Err(Error::ArgumentTypeMismatch {
                    index: 0,
                    expected: ret.encoding().to_string(),
                    found: value.kind_name(),
                });
            }
            marshal::write_address(out, marshal::widen(p, &narrow));
        }
        _ => {
            let mut scratch = Scratch::default();
            marshal::encode(ctx, ret, &value, 0, &mut out[..ret.size()], &mut scratch)?;
            ctx.retain(scratch);
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload = catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 1");
        let payload = catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panic");
    }
}
