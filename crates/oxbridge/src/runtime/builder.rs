//! Defining new classes at run time.
//!
//! ```
//! use oxbridge::{Dispatchable, RuntimeContext, Value};
//!
//! let ctx = RuntimeContext::builtin();
//! let object = ctx.class("Object")?.expect("root class");
//!
//! let mut counter = object.extend(&ctx, "DocCounter", 0)?;
//! counter.add_ivar("count", "q", None, None)?;
//! counter.add_method("increment", "q@:", |ctx, this, _| {
//!     let next = this.ivar(ctx, "count")?.as_i64().unwrap_or(0) + 1;
//!     this.set_ivar(ctx, "count", next)?;
//!     Ok(Value::Int(next))
//! })?;
//! let counter = counter.register()?;
//!
//! let instance = counter.invoke(&ctx, "new")?.into_object();
//! assert_eq!(instance.invoke(&ctx, "increment")?, Value::Int(1));
//! assert_eq!(instance.invoke(&ctx, "increment")?, Value::Int(2));
//! # Ok::<(), oxbridge::Error>(())
//! ```

use super::class::{Class, add_method_to};
use super::context::{RuntimeContext, c_string};
use super::object::Id;
use super::value::Value;
use crate::error::{Error, Result};
use oxbridge_log::debug;
use std::fmt;

/// A class that has been allocated but not yet registered.
///
/// Methods, ivars and protocols can be added until [`PendingClass::register`]
/// is called; afterwards those calls fail with [`Error::InvalidState`].
pub struct PendingClass {
    ctx: RuntimeContext,
    class: Class,
    name: String,
    registered: bool,
}

impl RuntimeContext {
    /// Allocates a class pair named `name` under `superclass` (a new root
    /// class when `None`), with `extra_bytes` of indexed storage.
    ///
    /// # Errors
    ///
    /// [`Error::ClassAllocation`] if the name is taken or the runtime
    /// refuses the allocation.
    pub fn extend(&self, superclass: Option<&Class>, name: &str, extra_bytes: usize) -> Result<PendingClass> {
        let c_name = c_string(name)?;
        let parent = superclass.map_or(std::ptr::null_mut(), |cls| cls.as_ptr());
        // SAFETY: parent is null or a runtime class, c_name is a valid C string
        let raw = unsafe { (self.api().allocate_class_pair)(parent, c_name.as_ptr(), extra_bytes) };
        let class = self.wrap_class(raw).ok_or_else(|| Error::ClassAllocation { name: name.to_string() })?;
        debug!("allocated class {name}");
        Ok(PendingClass {
            ctx: self.clone(),
            class,
            name: name.to_string(),
            registered: false,
        })
    }
}

impl PendingClass {
    /// The class being built.
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once [`PendingClass::register`] has succeeded.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn ensure_pending(&self, operation: &'static str) -> Result<()> {
        if self.registered {
            return Err(Error::InvalidState {
                class: self.name.clone(),
                operation,
            });
        }
        Ok(())
    }

    /// Adds an instance method implemented by `body`.
    ///
    /// `types` is the method's type string, receiver and selector included
    /// (for example `"v@:q"`). `body` receives the context, the receiver and
    /// the declared arguments.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] after registration,
    /// [`Error::InvalidSignature`] if `types` lacks the `@:` prefix,
    /// [`Error::MethodRegistration`] if the runtime rejects the method.
    pub fn add_method<F>(&mut self, selector: &str, types: &str, body: F) -> Result<&mut Self>
    where
        F: Fn(&RuntimeContext, &Id, &[Value]) -> Result<Value> + 'static,
    {
        self.ensure_pending("add a method")?;
        add_method_to(&self.ctx, &self.class, &self.name, selector, types, Box::new(body))?;
        Ok(self)
    }

    /// Adds a class method; it is registered on the metaclass.
    ///
    /// # Errors
    ///
    /// See [`PendingClass::add_method`].
    pub fn add_class_method<F>(&mut self, selector: &str, types: &str, body: F) -> Result<&mut Self>
    where
        F: Fn(&RuntimeContext, &Id, &[Value]) -> Result<Value> + 'static,
    {
        self.ensure_pending("add a class method")?;
        let meta = self.class.metaclass(&self.ctx).ok_or_else(|| Error::MethodRegistration {
            class: self.name.clone(),
            selector: selector.to_string(),
        })?;
        add_method_to(&self.ctx, &meta, &self.name, selector, types, Box::new(body))?;
        Ok(self)
    }

    /// Adds an instance variable.
    ///
    /// `size` defaults to the size of `encoding`. `alignment` is given as a
    /// power of two exponent. It defaults to log2 of `size` when `size` is a
    /// power of two (so a `{Point=dd}` ivar is 16-byte aligned) and to log2
    /// of the type's natural alignment otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] after registration, translation errors for
    /// `encoding`, and [`Error::IvarRegistration`] for a zero size or a
    /// rejection by the runtime (duplicate name, for instance).
    pub fn add_ivar(&mut self, name: &str, encoding: &str, size: Option<usize>, alignment: Option<u8>) -> Result<&mut Self> {
        self.ensure_pending("add an ivar")?;
        let descriptor = self.ctx.translate(encoding)?;
        let size = size.unwrap_or_else(|| descriptor.size());
        let alignment = alignment.unwrap_or_else(|| {
            let basis = if size.is_power_of_two() { size } else { descriptor.alignment() };
            basis.trailing_zeros() as u8
        });
        let rejected = || Error::IvarRegistration {
            class: self.name.clone(),
            name: name.to_string(),
        };
        if size == 0 {
            return Err(rejected());
        }

        let c_name = c_string(name)?;
        let c_types = c_string(descriptor.encoding())?;
        // SAFETY: the class is allocated and not yet registered
        let added = unsafe {
            (self.ctx.api().class_add_ivar)(self.class.as_ptr(), c_name.as_ptr(), size, alignment, c_types.as_ptr())
        };
        if !added {
            return Err(rejected());
        }
        debug!("added ivar {name} ({encoding}, {size} bytes) to {}", self.name);
        Ok(self)
    }

    /// Declares conformance to the protocol named `protocol`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] after registration, [`Error::UnresolvedName`]
    /// if no such protocol exists.
    pub fn add_protocol(&mut self, protocol: &str) -> Result<&mut Self> {
        self.ensure_pending("add a protocol")?;
        let found = self.ctx.protocol(protocol)?.ok_or_else(|| Error::UnresolvedName {
            name: protocol.to_string(),
        })?;
        // SAFETY: both handles come from the runtime
        let added = unsafe { (self.ctx.api().class_add_protocol)(self.class.as_ptr(), found.as_ptr()) };
        if added {
            debug!("{} adopts {protocol}", self.name);
        }
        Ok(self)
    }

    /// Registers the class with the runtime and publishes it under its name.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if already registered.
    pub fn register(&mut self) -> Result<Class> {
        self.ensure_pending("register")?;
        // SAFETY: the class pair was allocated by this builder
        unsafe { (self.ctx.api().register_class_pair)(self.class.as_ptr()) };
        self.registered = true;
        self.ctx
            .inner()
            .published
            .borrow_mut()
            .insert(self.name.clone(), self.class.clone());
        debug!("registered class {}", self.name);
        Ok(self.class.clone())
    }
}

impl fmt::Debug for PendingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingClass")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}
