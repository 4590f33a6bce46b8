//! Foreign calls shaped by a [`Signature`].

use super::context::RuntimeContext;
use super::encoding::{MarshalDescriptor, MarshalKind, Primitive, Signature};
use super::library::ForeignFunction;
use super::marshal::{self, Scratch};
use super::value::Value;
use crate::error::{Error, Result};
use libffi::middle::{Cif, CodePtr, Type};
use libffi::raw;
use std::ffi::c_void;
use std::mem::size_of;

/// The libffi type for one descriptor.
pub(crate) fn ffi_type(descriptor: &MarshalDescriptor) -> Type {
    match descriptor.kind() {
        MarshalKind::Primitive(p) => match p {
            Primitive::Char => Type::i8(),
            Primitive::UChar | Primitive::Bool => Type::u8(),
            Primitive::Short => Type::i16(),
            Primitive::UShort => Type::u16(),
            Primitive::Int => Type::i32(),
            Primitive::UInt => Type::u32(),
            Primitive::Long => Type::c_long(),
            Primitive::ULong => Type::c_ulong(),
            Primitive::LongLong => Type::i64(),
            Primitive::ULongLong => Type::u64(),
            Primitive::Float => Type::f32(),
            Primitive::Double => Type::f64(),
            Primitive::Void => Type::void(),
        },
        MarshalKind::Aggregate => match descriptor.layout() {
            Some(layout) => Type::structure(layout.fields().iter().map(|f| ffi_type(&f.descriptor))),
            None => Type::pointer(),
        },
        _ => Type::pointer(),
    }
}

pub(crate) fn build_cif(signature: &Signature) -> Cif {
    Cif::new(
        signature.arguments().iter().map(ffi_type),
        ffi_type(signature.return_type()),
    )
}

/// A prepared call interface plus the signature it was built from.
pub(crate) struct CallFrame {
    cif: Cif,
    signature: Signature,
}

impl CallFrame {
    pub(crate) fn new(signature: Signature) -> Self {
        CallFrame {
            cif: build_cif(&signature),
            signature,
        }
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls `code` with the raw `prefix` words (receiver and selector for
    /// methods) followed by `args` marshaled per the signature. Returns the
    /// raw return buffer.
    ///
    /// C strings and buffers built for pointer arguments are handed to the
    /// context afterwards, so a callee may keep them.
    ///
    /// # Safety
    ///
    /// `code` must have the native shape described by the signature.
    pub(crate) unsafe fn invoke(
        &self,
        ctx: &RuntimeContext,
        code: unsafe extern "C" fn(),
        prefix: &[usize],
        args: &[Value],
    ) -> Result<Vec<u64>> {
        let descriptors = self.signature.arguments();
        debug_assert_eq!(prefix.len() + args.len(), descriptors.len());

        let mut scratch = Scratch::default();
        let mut slots = Vec::with_capacity(descriptors.len());
        for &word in prefix {
            let mut slot = marshal::slot(size_of::<usize>());
            marshal::write_address(marshal::bytes_mut(&mut slot), word);
            slots.push(slot);
        }
        for (index, (descriptor, value)) in descriptors[prefix.len()..].iter().zip(args).enumerate() {
            let mut slot = marshal::slot(descriptor.size());
            marshal::encode(ctx, descriptor, value, index, marshal::bytes_mut(&mut slot), &mut scratch)?;
            slots.push(slot);
        }
        let mut pointers: Vec<*mut c_void> = slots.iter_mut().map(|s| s.as_mut_ptr().cast()).collect();

        let mut ret = marshal::slot(self.signature.return_type().size().max(size_of::<usize>()));
        // SAFETY: every slot matches its ffi type and outlives the call
        unsafe {
            raw::ffi_call(
                self.cif.as_raw_ptr(),
                Some(code),
                ret.as_mut_ptr().cast(),
                pointers.as_mut_ptr(),
            );
        }
        ctx.retain(scratch);
        Ok(ret)
    }

    /// Converts a return buffer filled by [`CallFrame::invoke`].
    pub(crate) fn decode_return(&self, ctx: &RuntimeContext, ret: &[u64]) -> Result<Value> {
        let descriptor = self.signature.return_type();
        match descriptor.primitive_kind() {
            Some(Primitive::Void) => Ok(Value::Nil),
            Some(p) if marshal::is_widened(p) => {
                let mut narrow = [0u8; 8];
                marshal::narrow(p, marshal::read_address(marshal::bytes(ret)), &mut narrow);
                Ok(marshal::decode_primitive(p, &narrow))
            }
            // SAFETY: the buffer holds what the callee returned for this type
            _ => unsafe { marshal::decode(ctx, descriptor, marshal::bytes(ret)) },
        }
    }
}

impl RuntimeContext {
    /// Calls a free function through a cached frame.
    pub(crate) fn call_function(&self, function: &ForeignFunction, args: &[Value]) -> Result<Value> {
        let signature = function.signature();
        if args.len() != signature.arguments().len() {
            return Err(Error::ArgumentCountMismatch {
                selector: function.name().to_string(),
                expected: signature.arguments().len(),
                got: args.len(),
            });
        }
        let frame = self.frame(&format!("fn {}", signature.encoding()), || Ok(signature.clone()))?;
        let code = CodePtr(function.address().cast_mut());
        // SAFETY: ForeignFunction::new requires the address to match the signature
        let ret = unsafe { frame.invoke(self, *code.as_fun(), &[], args)? };
        self.complete(&frame, &ret)
    }
}
