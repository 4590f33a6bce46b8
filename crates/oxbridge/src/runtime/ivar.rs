//! Instance variable handles.

use super::api::RawIvar;
use super::context::RuntimeContext;
use super::introspection::string_from;

/// An instance variable of some class. Not cached, like [`Method`](super::Method).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ivar(RawIvar);

impl Ivar {
    pub(crate) fn from_raw(raw: RawIvar) -> Option<Self> {
        (!raw.is_null()).then_some(Ivar(raw))
    }

    /// The native handle.
    pub fn as_ptr(self) -> RawIvar {
        self.0
    }

    /// Ivar name.
    pub fn name(self, ctx: &RuntimeContext) -> String {
        // SAFETY: the handle is a runtime ivar
        unsafe { string_from((ctx.api().ivar_get_name)(self.0)) }.unwrap_or_default()
    }

    /// Byte offset inside an instance.
    pub fn offset(self, ctx: &RuntimeContext) -> isize {
        // SAFETY: the handle is a runtime ivar
        unsafe { (ctx.api().ivar_get_offset)(self.0) }
    }

    /// Type encoding of the stored value.
    pub fn type_encoding(self, ctx: &RuntimeContext) -> String {
        // SAFETY: the handle is a runtime ivar
        unsafe { string_from((ctx.api().ivar_get_type_encoding)(self.0)) }.unwrap_or_default()
    }
}
