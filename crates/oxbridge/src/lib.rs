//! `oxbridge`: a dynamic bridge to Objective-C style object runtimes.
//!
//! The bridge lets host code talk to a native object runtime without
//! generated bindings:
//!
//! - **Dispatch** of any selector to any object or class, with argument and
//!   return shapes taken from the runtime's own type encodings
//! - **Identity** preserving wrappers: one [`Id`] per native object
//! - **Introspection** of classes, methods, ivars and protocols
//! - **Class building** with method bodies written as host closures
//! - **Metadata** for names the runtime cannot describe (constants, enums,
//!   structs and free functions)
//!
//! The default runtime is the bundled `oxbridge-rt` (feature
//! `builtin-runtime`); [`RuntimeSource::Library`] loads a runtime such as
//! GNUstep's `libobjc2` instead.
//!
//! # Example
//!
//! ```rust
//! use oxbridge::{Dispatchable, Id, RuntimeContext, Value};
//!
//! let ctx = RuntimeContext::builtin();
//! let object = ctx.class("Object")?.expect("root class");
//!
//! let instance = object.invoke(&ctx, "new")?.into_object();
//! assert_eq!(instance.invoke(&ctx, [("isKindOfClass", &object)])?, Value::Bool(true));
//!
//! // messages to nil return nil
//! let nobody: Option<Id> = None;
//! assert_eq!(nobody.invoke(&ctx, "hash")?, Value::Nil);
//! # Ok::<(), oxbridge::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{Config, FallbackPolicy, RuntimeSource};
pub use error::{Error, Result};
pub use runtime::{
    AggregateLayout, Class, Dispatchable, ForeignFunction, Id, Ivar, MarshalDescriptor, Message, MetadataSource,
    Method, MethodDeclaration, NativeLibrary, ObjectKind, PendingClass, Protocol, Resolved, RuntimeApi, RuntimeContext, Sel, Signature,
    StaticMetadata, StructValue, Value,
};
