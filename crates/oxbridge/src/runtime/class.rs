//! Class handles.

use super::builder::PendingClass;
use super::context::{RuntimeContext, c_string};
use super::imp::{MethodBody, make_imp};
use super::introspection::string_from;
use super::ivar::Ivar;
use super::method::Method;
use super::object::{Dispatchable, Id, ObjectKind};
use super::protocol::Protocol;
use super::value::Value;
use crate::error::{Error, Result};
use oxbridge_log::debug;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops::Deref;

/// A wrapped class or metaclass.
///
/// A class is an object: `Class` derefs to its [`Id`] and answers messages
/// the same way, with class methods.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Class(Id);

impl TryFrom<Id> for Class {
    type Error = Id;

    fn try_from(id: Id) -> std::result::Result<Self, Id> {
        match id.kind() {
            ObjectKind::Class => Ok(Class(id)),
            ObjectKind::Instance => Err(id),
        }
    }
}

impl From<Class> for Id {
    fn from(cls: Class) -> Self {
        cls.0
    }
}

impl Deref for Class {
    type Target = Id;

    fn deref(&self) -> &Id {
        &self.0
    }
}

impl Dispatchable for Class {
    fn receiver(&self) -> Option<&Id> {
        Some(&self.0)
    }
}

impl Class {
    /// The class as an object.
    pub fn as_id(&self) -> &Id {
        &self.0
    }

    /// Class name.
    pub fn name(&self, ctx: &RuntimeContext) -> String {
        // SAFETY: the handle is a runtime class
        unsafe { string_from((ctx.api().class_get_name)(self.as_ptr())) }.unwrap_or_default()
    }

    /// The superclass, `None` for a root class.
    pub fn superclass(&self, ctx: &RuntimeContext) -> Option<Class> {
        // SAFETY: the handle is a runtime class
        ctx.wrap_class(unsafe { (ctx.api().class_get_superclass)(self.as_ptr()) })
    }

    /// Moves this class under `superclass` and returns the previous one.
    ///
    /// Instance sizes and ivar offsets are left as they were; the runtime
    /// returns `None` and changes nothing when the move is rejected.
    pub fn set_superclass(&self, ctx: &RuntimeContext, superclass: &Class) -> Option<Class> {
        // SAFETY: both handles are runtime classes
        let previous = unsafe { (ctx.api().class_set_superclass)(self.as_ptr(), superclass.as_ptr()) };
        ctx.wrap_class(previous)
    }

    /// The class's metaclass, holding its class methods.
    pub fn metaclass(&self, ctx: &RuntimeContext) -> Option<Class> {
        self.class(ctx)
    }

    /// True for metaclasses.
    pub fn is_meta_class(&self, ctx: &RuntimeContext) -> bool {
        // SAFETY: the handle is a runtime class
        unsafe { (ctx.api().class_is_meta_class)(self.as_ptr()) }
    }

    /// Size in bytes of an instance.
    pub fn instance_size(&self, ctx: &RuntimeContext) -> usize {
        // SAFETY: the handle is a runtime class
        unsafe { (ctx.api().class_get_instance_size)(self.as_ptr()) }
    }

    /// The class version number.
    pub fn version(&self, ctx: &RuntimeContext) -> i32 {
        // SAFETY: the handle is a runtime class
        unsafe { (ctx.api().class_get_version)(self.as_ptr()) }
    }

    /// Sets the class version number.
    pub fn set_version(&self, ctx: &RuntimeContext, version: i32) {
        // SAFETY: the handle is a runtime class
        unsafe { (ctx.api().class_set_version)(self.as_ptr(), version) }
    }

    /// The instance method for `selector`, searching superclasses.
    ///
    /// # Errors
    ///
    /// Fails only for selector names containing a NUL byte.
    pub fn instance_method(&self, ctx: &RuntimeContext, selector: &str) -> Result<Option<Method>> {
        let sel = ctx.selector(selector)?;
        // SAFETY: the handle is a runtime class
        Ok(Method::from_raw(unsafe {
            (ctx.api().class_get_instance_method)(self.as_ptr(), sel.as_ptr())
        }))
    }

    /// The class method for `selector`, searching superclasses.
    ///
    /// # Errors
    ///
    /// Fails only for selector names containing a NUL byte.
    pub fn class_method(&self, ctx: &RuntimeContext, selector: &str) -> Result<Option<Method>> {
        let sel = ctx.selector(selector)?;
        // SAFETY: the handle is a runtime class
        Ok(Method::from_raw(unsafe {
            (ctx.api().class_get_class_method)(self.as_ptr(), sel.as_ptr())
        }))
    }

    /// The instance variable `name`, searching superclasses.
    ///
    /// # Errors
    ///
    /// Fails only for names containing a NUL byte.
    pub fn instance_variable(&self, ctx: &RuntimeContext, name: &str) -> Result<Option<Ivar>> {
        let c_name = c_string(name)?;
        // SAFETY: the handle is a runtime class
        Ok(Ivar::from_raw(unsafe {
            (ctx.api().class_get_instance_variable)(self.as_ptr(), c_name.as_ptr())
        }))
    }

    /// The class variable `name`: an ivar of the class object itself,
    /// searching the metaclass chain.
    ///
    /// # Errors
    ///
    /// Fails only for names containing a NUL byte.
    pub fn class_variable(&self, ctx: &RuntimeContext, name: &str) -> Result<Option<Ivar>> {
        let c_name = c_string(name)?;
        // SAFETY: the handle is a runtime class
        Ok(Ivar::from_raw(unsafe {
            (ctx.api().class_get_class_variable)(self.as_ptr(), c_name.as_ptr())
        }))
    }

    /// Methods defined directly on this class.
    pub fn instance_methods(&self, ctx: &RuntimeContext) -> Vec<Method> {
        let cls = self.as_ptr();
        // SAFETY: the runtime returns a freeable array of methods
        unsafe {
            ctx.collect_list(
                |count| (ctx.api().class_copy_method_list)(cls, count),
                Method::from_raw,
            )
        }
    }

    /// Class methods defined directly on this class.
    pub fn class_methods(&self, ctx: &RuntimeContext) -> Vec<Method> {
        self.metaclass(ctx).map(|meta| meta.instance_methods(ctx)).unwrap_or_default()
    }

    /// Instance variables declared directly by this class.
    pub fn instance_variables(&self, ctx: &RuntimeContext) -> Vec<Ivar> {
        let cls = self.as_ptr();
        // SAFETY: the runtime returns a freeable array of ivars
        unsafe { ctx.collect_list(|count| (ctx.api().class_copy_ivar_list)(cls, count), Ivar::from_raw) }
    }

    /// Ivars declared directly by the metaclass.
    pub fn class_variables(&self, ctx: &RuntimeContext) -> Vec<Ivar> {
        self.metaclass(ctx).map(|meta| meta.instance_variables(ctx)).unwrap_or_default()
    }

    /// The strong ivar layout bytes, if one was set.
    pub fn ivar_layout(&self, ctx: &RuntimeContext) -> Option<Vec<u8>> {
        // SAFETY: the handle is a runtime class
        unsafe { layout_from((ctx.api().class_get_ivar_layout)(self.as_ptr())) }
    }

    /// Sets the strong ivar layout. Runtimes only honor this before the
    /// class is registered.
    ///
    /// # Errors
    ///
    /// Fails if `layout` contains a NUL byte.
    pub fn set_ivar_layout(&self, ctx: &RuntimeContext, layout: &[u8]) -> Result<()> {
        let layout = layout_string(layout)?;
        // SAFETY: the handle is a runtime class, layout is NUL-terminated
        unsafe { (ctx.api().class_set_ivar_layout)(self.as_ptr(), layout.as_ptr().cast()) };
        Ok(())
    }

    /// The weak ivar layout bytes, if one was set.
    pub fn weak_ivar_layout(&self, ctx: &RuntimeContext) -> Option<Vec<u8>> {
        // SAFETY: the handle is a runtime class
        unsafe { layout_from((ctx.api().class_get_weak_ivar_layout)(self.as_ptr())) }
    }

    /// Sets the weak ivar layout.
    ///
    /// # Errors
    ///
    /// Fails if `layout` contains a NUL byte.
    pub fn set_weak_ivar_layout(&self, ctx: &RuntimeContext, layout: &[u8]) -> Result<()> {
        let layout = layout_string(layout)?;
        // SAFETY: the handle is a runtime class, layout is NUL-terminated
        unsafe { (ctx.api().class_set_weak_ivar_layout)(self.as_ptr(), layout.as_ptr().cast()) };
        Ok(())
    }

    /// Protocols this class adopts directly.
    pub fn protocols(&self, ctx: &RuntimeContext) -> Vec<Protocol> {
        let cls = self.as_ptr();
        // SAFETY: the runtime returns a freeable array of protocols
        unsafe {
            ctx.collect_list(
                |count| (ctx.api().class_copy_protocol_list)(cls, count),
                Protocol::from_raw,
            )
        }
    }

    /// True if this class or a superclass adopts `protocol`.
    pub fn conforms_to(&self, ctx: &RuntimeContext, protocol: &Protocol) -> bool {
        // SAFETY: both handles come from the runtime
        unsafe { (ctx.api().class_conforms_to_protocol)(self.as_ptr(), protocol.as_ptr()) }
    }

    /// True if instances respond to `selector`.
    ///
    /// # Errors
    ///
    /// Fails only for selector names containing a NUL byte.
    pub fn instances_respond_to(&self, ctx: &RuntimeContext, selector: &str) -> Result<bool> {
        let sel = ctx.selector(selector)?;
        // SAFETY: the handle is a runtime class
        Ok(unsafe { (ctx.api().class_responds_to_selector)(self.as_ptr(), sel.as_ptr()) })
    }

    /// Starts a subclass of this class.
    ///
    /// # Errors
    ///
    /// See [`RuntimeContext::extend`].
    pub fn extend(&self, ctx: &RuntimeContext, name: &str, extra_bytes: usize) -> Result<PendingClass> {
        ctx.extend(Some(self), name, extra_bytes)
    }

    /// Adds an instance method to a class, registered or not.
    ///
    /// Used from `+resolveInstanceMethod:` implementations and to add
    /// methods to existing classes.
    ///
    /// # Errors
    ///
    /// Fails if `types` is not a method signature or the runtime rejects the
    /// method (for example because the class already defines it).
    pub fn add_method<F>(&self, ctx: &RuntimeContext, selector: &str, types: &str, body: F) -> Result<()>
    where
        F: Fn(&RuntimeContext, &Id, &[Value]) -> Result<Value> + 'static,
    {
        add_method_to(ctx, self, &self.name(ctx), selector, types, Box::new(body))
    }

    /// Allocates zeroed storage for an instance without sending `alloc`.
    pub fn create_instance(&self, ctx: &RuntimeContext, extra_bytes: usize) -> Option<Id> {
        // SAFETY: the handle is a runtime class
        ctx.wrap(unsafe { (ctx.api().class_create_instance)(self.as_ptr(), extra_bytes) })
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({:#x})", self.address())
    }
}

fn layout_string(layout: &[u8]) -> Result<CString> {
    CString::new(layout).map_err(|_| Error::InvalidName {
        name: String::from_utf8_lossy(layout).into_owned(),
    })
}

/// # Safety
///
/// `ptr` must be null or a NUL-terminated byte string.
unsafe fn layout_from(ptr: *const u8) -> Option<Vec<u8>> {
    // SAFETY: caller contract
    (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr.cast()) }.to_bytes().to_vec())
}

/// Wraps `body` as an IMP and adds it to `target`.
pub(crate) fn add_method_to(
    ctx: &RuntimeContext,
    target: &Class,
    class_name: &str,
    selector: &str,
    types: &str,
    body: MethodBody,
) -> Result<()> {
    let signature = ctx.parse_signature(types)?;
    let sel = ctx.selector(selector)?;
    let c_types = c_string(&signature.encoding())?;
    let imp = make_imp(ctx, selector, signature, body)?;

    // SAFETY: target is a runtime class, imp matches the types string
    let added = unsafe { (ctx.api().class_add_method)(target.as_ptr(), sel.as_ptr(), imp, c_types.as_ptr()) };
    if !added {
        return Err(Error::MethodRegistration {
            class: class_name.to_string(),
            selector: selector.to_string(),
        });
    }
    debug!("added {selector} ({types}) to {class_name}");
    Ok(())
}
