//! Shared libraries and the C functions resolved from them.

use super::context::RuntimeContext;
use super::encoding::Signature;
use super::value::Value;
use crate::error::{Error, Result};
use libloading::Library;
use oxbridge_log::debug;
use std::ffi::{OsStr, c_void};
use std::fmt;

/// A shared library that stays loaded for the rest of the process.
///
/// Symbols resolved from it (function tables, method implementations,
/// constants) are handed out as plain pointers, so the library is leaked
/// rather than unloaded.
#[derive(Clone, Copy)]
pub struct NativeLibrary {
    name: &'static str,
    library: &'static Library,
}

impl NativeLibrary {
    /// Opens the library at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Library`] if the loader rejects the path.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        // SAFETY: running library initialisers is the point of opening it
        let library = unsafe { Library::new(path) }.map_err(|e| Error::Library {
            path: name.clone(),
            reason: e.to_string(),
        })?;
        debug!("opened {name}");
        Ok(NativeLibrary {
            name: Box::leak(name.into_boxed_str()),
            library: Box::leak(Box::new(library)),
        })
    }

    /// The executable and everything it already linked.
    #[cfg(unix)]
    pub fn this() -> Self {
        NativeLibrary {
            name: "<process>",
            library: Box::leak(Box::new(Library::from(libloading::os::unix::Library::this()))),
        }
    }

    /// The name or path the library was opened with.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Resolves `symbol` as a value of type `T`, usually a function pointer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if the library does not export it.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's real type.
    pub unsafe fn function<T: Copy>(&self, symbol: &str) -> Result<T> {
        // SAFETY: caller contract
        let resolved = unsafe { self.library.get::<T>(symbol.as_bytes()) };
        resolved.map(|s| *s).map_err(|_| Error::SymbolNotFound {
            symbol: symbol.to_string(),
        })
    }

    /// Address of `symbol`, or `None` if it is not exported.
    pub fn symbol(&self, symbol: &str) -> Option<*mut c_void> {
        // SAFETY: reading a symbol as a data pointer only yields its address
        let resolved = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) };
        resolved.ok().map(|s| *s).filter(|p| !p.is_null())
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeLibrary").field(&self.name).finish()
    }
}

/// A free C function with a known signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignFunction {
    name: String,
    address: usize,
    signature: Signature,
}

impl ForeignFunction {
    /// Wraps the function at `address`.
    ///
    /// # Safety
    ///
    /// `address` must point at a C function with exactly `signature`.
    pub unsafe fn new(name: impl Into<String>, address: *const c_void, signature: Signature) -> Self {
        ForeignFunction {
            name: name.into(),
            address: address as usize,
            signature,
        }
    }

    /// Symbol name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Code address.
    pub fn address(&self) -> *const c_void {
        self.address as *const c_void
    }

    /// Return and argument types.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the function, marshaling `args` by the signature.
    ///
    /// # Errors
    ///
    /// Fails on argument count or type mismatches.
    pub fn call(&self, ctx: &RuntimeContext, args: &[Value]) -> Result<Value> {
        ctx.call_function(self, args)
    }
}
