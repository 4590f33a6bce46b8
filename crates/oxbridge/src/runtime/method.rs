//! Method handles.

use super::api::{RawImp, RawMethod};
use super::context::RuntimeContext;
use super::encoding::Signature;
use super::imp::make_imp;
use super::introspection::string_from;
use super::library::ForeignFunction;
use super::object::Id;
use super::selector::Sel;
use super::value::Value;
use crate::error::{Error, Result};
use std::ffi::c_uint;

/// A method of some class.
///
/// Method handles are transient introspection results and are not cached:
/// two lookups of the same method compare equal but are separate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method(RawMethod);

impl Method {
    pub(crate) fn from_raw(raw: RawMethod) -> Option<Self> {
        (!raw.is_null()).then_some(Method(raw))
    }

    /// The native handle.
    pub fn as_ptr(self) -> RawMethod {
        self.0
    }

    /// The method's selector.
    pub fn selector(self, ctx: &RuntimeContext) -> Option<Sel> {
        // SAFETY: the handle is a runtime method
        Sel::from_raw(unsafe { (ctx.api().method_get_name)(self.0) })
    }

    /// The method's selector name.
    pub fn name(self, ctx: &RuntimeContext) -> String {
        self.selector(ctx).map(|sel| sel.name(ctx)).unwrap_or_default()
    }

    /// The full type string as stored by the runtime.
    pub fn type_encoding(self, ctx: &RuntimeContext) -> Option<String> {
        // SAFETY: the handle is a runtime method
        unsafe { string_from((ctx.api().method_get_type_encoding)(self.0)) }
    }

    /// Number of arguments, counting the receiver and selector.
    pub fn number_of_arguments(self, ctx: &RuntimeContext) -> usize {
        // SAFETY: the handle is a runtime method
        unsafe { (ctx.api().method_get_number_of_arguments)(self.0) as usize }
    }

    /// The return type encoding.
    pub fn return_type(self, ctx: &RuntimeContext) -> Option<String> {
        // SAFETY: the runtime allocates the copy for us to free
        unsafe { ctx.take_string((ctx.api().method_copy_return_type)(self.0)) }
    }

    /// The encoding of argument `index`; 0 is the receiver, 1 the selector.
    pub fn argument_type(self, ctx: &RuntimeContext, index: usize) -> Option<String> {
        let index = c_uint::try_from(index).ok()?;
        // SAFETY: the runtime allocates the copy for us to free
        unsafe { ctx.take_string((ctx.api().method_copy_argument_type)(self.0, index)) }
    }

    /// Every argument encoding, receiver and selector included.
    pub fn argument_types(self, ctx: &RuntimeContext) -> Vec<String> {
        (0..self.number_of_arguments(ctx))
            .map_while(|i| self.argument_type(ctx, i))
            .collect()
    }

    /// The translated signature.
    ///
    /// # Errors
    ///
    /// Fails if an encoding cannot be translated or the signature lacks the
    /// receiver and selector slots.
    pub fn types(self, ctx: &RuntimeContext) -> Result<Signature> {
        let ret = self.return_type(ctx).ok_or_else(|| Error::InvalidSignature {
            signature: self.type_encoding(ctx).unwrap_or_default(),
        })?;
        ctx.method_signature(&ret, &self.argument_types(ctx))
    }

    /// The implementation as a callable function.
    ///
    /// Calling it directly bypasses dispatch: pass the receiver and the
    /// selector as the first two arguments.
    ///
    /// # Errors
    ///
    /// See [`Method::types`].
    pub fn implementation(self, ctx: &RuntimeContext) -> Result<Option<ForeignFunction>> {
        // SAFETY: the handle is a runtime method
        let imp = unsafe { (ctx.api().method_get_implementation)(self.0) };
        self.function_for(ctx, imp)
    }

    fn function_for(self, ctx: &RuntimeContext, imp: RawImp) -> Result<Option<ForeignFunction>> {
        let Some(code) = imp else {
            return Ok(None);
        };
        let signature = self.types(ctx)?;
        // SAFETY: the runtime stores IMPs matching the method's types
        Ok(Some(unsafe { ForeignFunction::new(self.name(ctx), code as *const std::ffi::c_void, signature) }))
    }

    /// Replaces the implementation with `body`, returning the previous one.
    ///
    /// # Errors
    ///
    /// Fails if the method's types cannot be translated.
    pub fn set_implementation<F>(self, ctx: &RuntimeContext, body: F) -> Result<Option<ForeignFunction>>
    where
        F: Fn(&RuntimeContext, &Id, &[Value]) -> Result<Value> + 'static,
    {
        let signature = self.types(ctx)?;
        let imp = make_imp(ctx, &self.name(ctx), signature, Box::new(body))?;
        // SAFETY: the new IMP matches the method's types
        let previous = unsafe { (ctx.api().method_set_implementation)(self.0, imp) };
        self.function_for(ctx, previous)
    }

    /// Swaps the implementations of two methods.
    pub fn exchange_implementations(self, ctx: &RuntimeContext, other: Method) {
        // SAFETY: both handles are runtime methods
        unsafe { (ctx.api().method_exchange_implementations)(self.0, other.0) }
    }
}
