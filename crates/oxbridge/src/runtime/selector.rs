//! Interned selectors.

use super::api::RawSel;
use super::context::{RuntimeContext, c_string};
use super::introspection::string_from;
use crate::error::Result;
use oxbridge_log::trace;

/// A runtime selector.
///
/// Selectors are interned: equal names give equal `Sel`s, distinct names
/// distinct ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sel(RawSel);

impl Sel {
    pub(crate) fn from_raw(raw: RawSel) -> Option<Self> {
        (!raw.is_null()).then_some(Sel(raw))
    }

    /// The native handle.
    pub fn as_ptr(self) -> RawSel {
        self.0
    }

    /// The selector's name.
    pub fn name(self, ctx: &RuntimeContext) -> String {
        // SAFETY: Sel values only come from the runtime
        unsafe { string_from((ctx.api().sel_get_name)(self.0)) }.unwrap_or_default()
    }
}

impl RuntimeContext {
    /// Interns `name`, registering it with the runtime on first use.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidName`](crate::Error::InvalidName) if the
    /// name contains a NUL byte.
    pub fn selector(&self, name: &str) -> Result<Sel> {
        if let Some(&sel) = self.inner().selectors.borrow().get(name) {
            return Ok(sel);
        }
        let c_name = c_string(name)?;
        // SAFETY: c_name is a valid C string
        let sel = Sel(unsafe { (self.api().sel_register_name)(c_name.as_ptr()) });
        trace!("interned {name} -> {:p}", sel.0);
        self.inner().selectors.borrow_mut().insert(name.to_string(), sel);
        Ok(sel)
    }

    /// Number of selectors interned through this context.
    pub fn interned_selectors(&self) -> usize {
        self.inner().selectors.borrow().len()
    }
}
