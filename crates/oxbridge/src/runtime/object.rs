//! Object handles and the dispatch capability shared with classes.

use super::api::RawId;
use super::class::Class;
use super::context::{RuntimeContext, c_string};
use super::dispatch::Message;
use super::introspection::string_from;
use super::ivar::Ivar;
use super::marshal::{self, Scratch};
use super::method::Method;
use super::value::Value;
use crate::error::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Whether a handle refers to an instance or to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// An ordinary object.
    Instance,
    /// A class or metaclass.
    Class,
}

pub(crate) struct IdInner {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

/// A wrapped native object.
///
/// Ids come from a context's identity cache, so equality is identity: two
/// `Id`s are equal exactly when they are the same wrapper, which happens
/// exactly when they wrap the same address.
#[derive(Clone)]
pub struct Id {
    inner: Rc<IdInner>,
}

impl Id {
    pub(crate) fn from_inner(inner: Rc<IdInner>) -> Self {
        Id { inner }
    }

    /// The native handle.
    pub fn as_ptr(&self) -> RawId {
        self.inner.handle as RawId
    }

    /// The native address.
    pub fn address(&self) -> usize {
        self.inner.handle
    }

    /// Instance or class.
    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    /// True if the handle is a class or metaclass.
    pub fn is_class(&self) -> bool {
        self.inner.kind == ObjectKind::Class
    }

    /// True if both are the same wrapper.
    pub fn ptr_eq(a: &Id, b: &Id) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// The object's class. For a class this is its metaclass.
    pub fn class(&self, ctx: &RuntimeContext) -> Option<Class> {
        // SAFETY: the handle is a live runtime object
        ctx.wrap_class(unsafe { (ctx.api().object_get_class)(self.as_ptr()) })
    }

    /// Name of the object's class.
    pub fn class_name(&self, ctx: &RuntimeContext) -> String {
        // SAFETY: the handle is a live runtime object
        unsafe { string_from((ctx.api().object_get_class_name)(self.as_ptr())) }.unwrap_or_default()
    }

    /// Changes the object's class, returning the previous one.
    pub fn set_class(&self, ctx: &RuntimeContext, cls: &Class) -> Option<Class> {
        // SAFETY: both handles are live runtime objects
        ctx.wrap_class(unsafe { (ctx.api().object_set_class)(self.as_ptr(), cls.as_ptr()) })
    }

    /// The object's class followed by each of its superclasses.
    pub fn ancestors(&self, ctx: &RuntimeContext) -> Vec<Class> {
        std::iter::successors(self.class(ctx), |cls| cls.superclass(ctx)).collect()
    }

    /// True if the object's class chain implements `selector`.
    ///
    /// # Errors
    ///
    /// Fails only for selector names containing a NUL byte.
    pub fn responds_to(&self, ctx: &RuntimeContext, selector: &str) -> Result<bool> {
        let sel = ctx.selector(selector)?;
        // SAFETY: the handle is a live runtime object
        Ok(unsafe {
            let cls = (ctx.api().object_get_class)(self.as_ptr());
            (ctx.api().class_responds_to_selector)(cls, sel.as_ptr())
        })
    }

    fn find_ivar(&self, ctx: &RuntimeContext, name: &str) -> Result<Ivar> {
        let c_name = c_string(name)?;
        // SAFETY: the handle is a live runtime object, c_name a valid C string
        let raw = unsafe {
            let cls = (ctx.api().object_get_class)(self.as_ptr());
            (ctx.api().class_get_instance_variable)(cls, c_name.as_ptr())
        };
        Ivar::from_raw(raw).ok_or_else(|| Error::IvarNotFound { name: name.to_string() })
    }

    /// Reads the instance variable `name`, decoded by its type encoding.
    ///
    /// # Errors
    ///
    /// Fails if no such ivar exists or its encoding cannot be translated.
    pub fn ivar(&self, ctx: &RuntimeContext, name: &str) -> Result<Value> {
        let ivar = self.find_ivar(ctx, name)?;
        let descriptor = ctx.translate(&ivar.type_encoding(ctx))?;
        let offset = ivar.offset(ctx);
        // SAFETY: the runtime laid the ivar out at `offset` with this encoding's size
        unsafe {
            let start = self.as_ptr().cast::<u8>().offset(offset);
            let bytes = std::slice::from_raw_parts(start, descriptor.size());
            marshal::decode(ctx, &descriptor, bytes)
        }
    }

    /// Writes the instance variable `name`.
    ///
    /// Strings and struct buffers referenced by the new value stay alive for
    /// the context's lifetime.
    ///
    /// # Errors
    ///
    /// Fails if no such ivar exists or `value` does not fit its encoding.
    pub fn set_ivar(&self, ctx: &RuntimeContext, name: &str, value: impl Into<Value>) -> Result<()> {
        let ivar = self.find_ivar(ctx, name)?;
        let descriptor = ctx.translate(&ivar.type_encoding(ctx))?;
        let offset = ivar.offset(ctx);

        let mut slot = marshal::slot(descriptor.size());
        let mut scratch = Scratch::default();
        marshal::encode(ctx, &descriptor, &value.into(), 0, marshal::bytes_mut(&mut slot), &mut scratch)?;
        // SAFETY: the runtime laid the ivar out at `offset` with this encoding's size
        unsafe {
            let start = self.as_ptr().cast::<u8>().offset(offset);
            std::ptr::copy_nonoverlapping(marshal::bytes(&slot).as_ptr(), start, descriptor.size());
        }
        ctx.retain(scratch);
        Ok(())
    }

    /// Instance variables of the object's class chain, nearest class first.
    ///
    /// `max_depth` limits how many classes are visited; `sort` orders the
    /// result by name.
    pub fn ivars(&self, ctx: &RuntimeContext, max_depth: Option<usize>, sort: bool) -> Vec<Ivar> {
        let mut ivars: Vec<Ivar> = self
            .ancestors(ctx)
            .iter()
            .take(max_depth.unwrap_or(usize::MAX))
            .flat_map(|cls| cls.instance_variables(ctx))
            .collect();
        if sort {
            ivars.sort_by_cached_key(|ivar| ivar.name(ctx));
        }
        ivars
    }

    /// Methods the object responds to, walking its class chain.
    ///
    /// For a class this lists class methods. `max_depth` and `sort` work as
    /// in [`Id::ivars`].
    pub fn methods(&self, ctx: &RuntimeContext, max_depth: Option<usize>, sort: bool) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .ancestors(ctx)
            .iter()
            .take(max_depth.unwrap_or(usize::MAX))
            .flat_map(|cls| cls.instance_methods(ctx))
            .collect();
        if sort {
            methods.sort_by_cached_key(|method| method.name(ctx));
        }
        methods
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        Id::ptr_eq(self, other)
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.handle.hash(state);
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:#x}, {:?})", self.inner.handle, self.inner.kind)
    }
}

/// Something messages can be sent to.
///
/// Implemented by [`Id`], [`Class`] and `Option<Id>`. A `None` receiver
/// answers every message with [`Value::Nil`] without calling the runtime.
pub trait Dispatchable {
    /// The receiving object, or `None` for nil.
    fn receiver(&self) -> Option<&Id>;

    /// Sends `message`, resolving its signature from the receiver's class.
    ///
    /// # Errors
    ///
    /// See [`RuntimeContext::msg_send`].
    fn invoke(&self, ctx: &RuntimeContext, message: impl Into<Message>) -> Result<Value> {
        match self.receiver() {
            Some(receiver) => ctx.msg_send(receiver, message),
            None => Ok(Value::Nil),
        }
    }

    /// Sends `message` to the implementation in the receiver's superclass.
    ///
    /// # Errors
    ///
    /// See [`RuntimeContext::msg_send_super`].
    fn invoke_super(&self, ctx: &RuntimeContext, message: impl Into<Message>) -> Result<Value> {
        match self.receiver() {
            Some(receiver) => ctx.msg_send_super(receiver, message),
            None => Ok(Value::Nil),
        }
    }
}

impl Dispatchable for Id {
    fn receiver(&self) -> Option<&Id> {
        Some(self)
    }
}

impl Dispatchable for Option<Id> {
    fn receiver(&self) -> Option<&Id> {
        self.as_ref()
    }
}
