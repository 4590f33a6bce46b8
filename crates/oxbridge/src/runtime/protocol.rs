//! Protocol handles.

use super::api::{MethodDescription, RawProtocol};
use super::context::RuntimeContext;
use super::introspection::string_from;
use super::selector::Sel;

/// A runtime protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protocol(RawProtocol);

/// A method declared by a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDeclaration {
    /// Selector name.
    pub selector: String,
    /// Method type string.
    pub types: String,
}

impl Protocol {
    pub(crate) fn from_raw(raw: RawProtocol) -> Option<Self> {
        (!raw.is_null()).then_some(Protocol(raw))
    }

    /// The native handle.
    pub fn as_ptr(self) -> RawProtocol {
        self.0
    }

    /// Protocol name.
    pub fn name(self, ctx: &RuntimeContext) -> String {
        // SAFETY: the handle is a runtime protocol
        unsafe { string_from((ctx.api().protocol_get_name)(self.0)) }.unwrap_or_default()
    }

    /// Methods declared as required or optional, instance or class side.
    pub fn method_descriptions(self, ctx: &RuntimeContext, required: bool, instance: bool) -> Vec<MethodDeclaration> {
        let api = ctx.api();
        // SAFETY: the runtime returns a freeable array; the strings it
        // points at belong to the protocol
        unsafe {
            ctx.collect_list(
                |count| (api.protocol_copy_method_description_list)(self.0, required, instance, count),
                |desc: MethodDescription| {
                    Some(MethodDeclaration {
                        selector: Sel::from_raw(desc.name)?.name(ctx),
                        types: string_from(desc.types).unwrap_or_default(),
                    })
                },
            )
        }
    }

    /// True if this protocol is, or incorporates, `other`.
    pub fn conforms_to(self, ctx: &RuntimeContext, other: Protocol) -> bool {
        // SAFETY: both handles are runtime protocols
        unsafe { (ctx.api().protocol_conforms_to_protocol)(self.0, other.0) }
    }
}
