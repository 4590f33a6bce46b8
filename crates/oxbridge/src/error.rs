//! Error types for the `oxbridge` dispatch and marshaling layer.
//!
//! Every fallible operation returns [`Result`]. Errors surface to the
//! immediate caller and are never retried; the only local recovery is the
//! assumed signature for selectors the runtime has no metadata for.

use crate::runtime::Id;
use std::fmt;

/// Errors that can occur while translating encodings, dispatching messages
/// or building classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A type encoding does not match the encoding grammar.
    MalformedEncoding {
        /// The offending encoding.
        encoding: String,
        /// What the parser expected.
        reason: String,
    },

    /// A well-formed encoding describes a shape that cannot be marshaled
    /// (arrays, unions, bit-fields, long doubles, empty structs).
    UnsupportedType {
        /// The offending encoding.
        encoding: String,
    },

    /// A by-value struct names a layout nobody registered.
    UnknownAggregate {
        /// The struct name.
        name: String,
    },

    /// A method signature lacks the implicit receiver and selector slots.
    InvalidSignature {
        /// The offending signature.
        signature: String,
    },

    /// A message or function call supplied the wrong number of arguments.
    ArgumentCountMismatch {
        /// Selector or symbol being called.
        selector: String,
        /// Number of declared arguments.
        expected: usize,
        /// Number of arguments supplied.
        got: usize,
    },

    /// An argument value cannot be converted to its declared type.
    ArgumentTypeMismatch {
        /// Position among the declared arguments.
        index: usize,
        /// The declared type encoding.
        expected: String,
        /// The kind of value supplied.
        found: &'static str,
    },

    /// No metadata exists for a selector and the fallback policy denies
    /// assuming a signature.
    UnrecognizedSelector {
        /// The selector name.
        selector: String,
    },

    /// The runtime refused to allocate a class pair.
    ClassAllocation {
        /// The requested class name.
        name: String,
    },

    /// The runtime refused to add a method.
    MethodRegistration {
        /// Class receiving the method.
        class: String,
        /// Selector of the method.
        selector: String,
    },

    /// The runtime refused to add an instance variable.
    IvarRegistration {
        /// Class receiving the ivar.
        class: String,
        /// Name of the ivar.
        name: String,
    },

    /// A class mutation was attempted after the class was registered.
    InvalidState {
        /// The class name.
        class: String,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The runtime raised an exception during a call.
    Exception {
        /// The native exception object.
        exception: Id,
        /// Exception name, if the object exposes one.
        name: Option<String>,
        /// Exception reason, if the object exposes one.
        reason: Option<String>,
    },

    /// A host-side method implementation failed or panicked.
    Callback {
        /// Selector of the method being implemented.
        selector: String,
        /// Failure description.
        reason: String,
    },

    /// A name cannot cross into the runtime because it contains a NUL byte.
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// No instance variable with this name exists on the object's class chain.
    IvarNotFound {
        /// The ivar name.
        name: String,
    },

    /// A name is neither a class nor described by any metadata source.
    UnresolvedName {
        /// The name.
        name: String,
    },

    /// A symbol is missing from every loaded library.
    SymbolNotFound {
        /// The symbol name.
        symbol: String,
    },

    /// A shared library could not be opened.
    Library {
        /// Path given to the loader.
        path: String,
        /// Loader error message.
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedEncoding { encoding, reason } => {
                write!(f, "Malformed type encoding '{encoding}': {reason}")
            }
            Error::UnsupportedType { encoding } => {
                write!(f, "Unsupported type encoding '{encoding}'")
            }
            Error::UnknownAggregate { name } => {
                write!(f, "No layout registered for struct '{name}'")
            }
            Error::InvalidSignature { signature } => {
                write!(
                    f,
                    "Invalid types string '{signature}': expected '@' and ':' after the return type"
                )
            }
            Error::ArgumentCountMismatch {
                selector,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Argument count mismatch for '{selector}': expected {expected}, got {got}"
                )
            }
            Error::ArgumentTypeMismatch {
                index,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Argument type mismatch at index {index}: expected '{expected}', got {found}"
                )
            }
            Error::UnrecognizedSelector { selector } => {
                write!(f, "No method signature known for selector '{selector}'")
            }
            Error::ClassAllocation { name } => {
                write!(f, "Could not allocate class '{name}'")
            }
            Error::MethodRegistration { class, selector } => {
                write!(f, "Could not add method '{selector}' to class '{class}'")
            }
            Error::IvarRegistration { class, name } => {
                write!(f, "Could not add ivar '{name}' to class '{class}'")
            }
            Error::InvalidState { class, operation } => {
                write!(
                    f,
                    "Cannot {operation} on class '{class}': it is already registered"
                )
            }
            Error::Exception {
                exception,
                name,
                reason,
            } => {
                let name = name.as_deref().unwrap_or("exception");
                match reason {
                    Some(reason) => write!(f, "{name} raised by {exception:?}: {reason}"),
                    None => write!(f, "{name} raised by {exception:?}"),
                }
            }
            Error::Callback { selector, reason } => {
                write!(f, "Method implementation for '{selector}' failed: {reason}")
            }
            Error::InvalidName { name } => {
                write!(f, "Name {name:?} contains an interior NUL byte")
            }
            Error::IvarNotFound { name } => write!(f, "No ivar named '{name}'"),
            Error::UnresolvedName { name } => {
                write!(f, "'{name}' is not a class or a known symbol")
            }
            Error::SymbolNotFound { symbol } => {
                write!(f, "Symbol '{symbol}' not found in any loaded library")
            }
            Error::Library { path, reason } => {
                write!(f, "Could not load library '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `oxbridge` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!(
                "{}",
                Error::InvalidSignature {
                    signature: "v:@".into()
                }
            ),
            "Invalid types string 'v:@': expected '@' and ':' after the return type"
        );
        assert_eq!(
            format!(
                "{}",
                Error::InvalidState {
                    class: "Derived".into(),
                    operation: "add a method"
                }
            ),
            "Cannot add a method on class 'Derived': it is already registered"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            Error::UnsupportedType {
                encoding: "[4i]".into()
            },
            Error::UnsupportedType {
                encoding: "[4i]".into()
            }
        );
        assert_ne!(
            Error::ClassAllocation { name: "A".into() },
            Error::ClassAllocation { name: "B".into() }
        );
    }
}
