//! The bridge runtime layer.
//!
//! - [`encoding`]: type encoding translator and call signatures
//! - [`api`]: the native runtime surface as a function table
//! - [`library`]: shared libraries and callable foreign functions
//! - [`context`]: per-runtime state shared by everything below
//! - [`object`], [`class`], [`selector`], [`method`], [`ivar`], [`protocol`]:
//!   handle wrappers and the introspection calls on them
//! - [`dispatch`]: message sends, super sends and exception capture
//! - [`builder`]: classes defined at run time with host method bodies
//! - [`metadata`]: constants, enums, structs and functions from metadata sources
//!
//! Native calls go through libffi. Argument and return shapes are cached
//! per type string, so repeated sends of the same shape reuse one prepared
//! call interface.

pub mod api;
pub mod builder;
mod call;
pub mod class;
pub mod context;
pub mod dispatch;
pub mod encoding;
mod identity;
mod imp;
mod introspection;
pub mod ivar;
pub mod library;
mod marshal;
pub mod metadata;
pub mod method;
pub mod object;
pub mod protocol;
pub mod selector;
pub mod value;

pub use api::{ObjcSuper, RawClass, RawId, RawImp, RawIvar, RawMethod, RawProtocol, RawSel, RuntimeApi};
pub use builder::PendingClass;
pub use class::Class;
pub use context::RuntimeContext;
pub use dispatch::Message;
pub use encoding::{
    AggregateLayout, Field, MarshalDescriptor, MarshalKind, Primitive, Signature, Translator, parse_signature,
    translate, translate_sequence,
};
pub use ivar::Ivar;
pub use library::{ForeignFunction, NativeLibrary};
pub use metadata::{ConstantInfo, FunctionInfo, MetadataSource, Resolved, StaticMetadata};
pub use method::Method;
pub use object::{Dispatchable, Id, ObjectKind};
pub use protocol::{MethodDeclaration, Protocol};
pub use selector::Sel;
pub use value::{StructValue, Value};
