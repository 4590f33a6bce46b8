//! Names the runtime cannot describe: constants, enums, structs and free
//! functions, supplied by [`MetadataSource`]s.
//!
//! A source stands for the metadata document of one library. Sources are
//! optional; without them the bridge works from runtime introspection alone.

use super::class::Class;
use super::context::RuntimeContext;
use super::library::ForeignFunction;
use super::marshal;
use super::value::Value;
use crate::error::{Error, Result};
use fxhash::FxHashMap;
use oxbridge_log::{debug, trace};

/// A constant's encoding and, optionally, its bytes.
///
/// Without bytes the value is read from the exported symbol of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantInfo {
    /// Type encoding of the value
    pub encoding: String,
    /// Native bytes of the value, when known ahead of time
    pub value: Option<Vec<u8>>,
}

/// A free function's return and argument encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Return type encoding
    pub ret: String,
    /// Argument type encodings, in order
    pub args: Vec<String>,
}

/// Per-library metadata lookups.
pub trait MetadataSource {
    /// The library the metadata describes.
    fn library(&self) -> &str;

    /// The encoding (and bytes, when known) of the constant `name`.
    fn lookup_constant(&self, name: &str) -> Option<ConstantInfo>;

    /// The signature of the free function `name`.
    fn lookup_function(&self, name: &str) -> Option<FunctionInfo>;

    /// The struct encoding for `name`, such as `{Point=dd}`.
    fn lookup_struct(&self, name: &str) -> Option<String>;

    /// The value of the enum member `name`.
    fn lookup_enum(&self, name: &str) -> Option<i64>;
}

/// An in-memory [`MetadataSource`].
///
/// ```
/// use oxbridge::StaticMetadata;
/// use oxbridge::MetadataSource;
///
/// let meta = StaticMetadata::new("libdemo")
///     .with_enum("DemoModeFast", 2)
///     .with_struct("Point", "{Point=dd}")
///     .with_function("demo_add", "i", ["i", "i"]);
/// assert_eq!(meta.lookup_enum("DemoModeFast"), Some(2));
/// assert_eq!(meta.lookup_struct("Point").as_deref(), Some("{Point=dd}"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    library: String,
    constants: FxHashMap<String, ConstantInfo>,
    functions: FxHashMap<String, FunctionInfo>,
    structs: FxHashMap<String, String>,
    enums: FxHashMap<String, i64>,
}

impl StaticMetadata {
    /// Empty metadata for `library`.
    pub fn new(library: impl Into<String>) -> Self {
        StaticMetadata {
            library: library.into(),
            ..Default::default()
        }
    }

    /// A constant with known bytes.
    #[must_use]
    pub fn with_constant(mut self, name: &str, encoding: &str, value: impl Into<Vec<u8>>) -> Self {
        self.constants.insert(
            name.to_string(),
            ConstantInfo {
                encoding: encoding.to_string(),
                value: Some(value.into()),
            },
        );
        self
    }

    /// A constant read from the exported symbol `name`.
    #[must_use]
    pub fn with_symbol_constant(mut self, name: &str, encoding: &str) -> Self {
        self.constants.insert(
            name.to_string(),
            ConstantInfo {
                encoding: encoding.to_string(),
                value: None,
            },
        );
        self
    }

    /// A free function returning `ret` and taking `args`.
    #[must_use]
    pub fn with_function<S: Into<String>>(mut self, name: &str, ret: &str, args: impl IntoIterator<Item = S>) -> Self {
        self.functions.insert(
            name.to_string(),
            FunctionInfo {
                ret: ret.to_string(),
                args: args.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// A struct encoding loaded when `name` is first translated.
    #[must_use]
    pub fn with_struct(mut self, name: &str, encoding: &str) -> Self {
        self.structs.insert(name.to_string(), encoding.to_string());
        self
    }

    /// An enum member.
    #[must_use]
    pub fn with_enum(mut self, name: &str, value: i64) -> Self {
        self.enums.insert(name.to_string(), value);
        self
    }
}

impl MetadataSource for StaticMetadata {
    fn library(&self) -> &str {
        &self.library
    }

    fn lookup_constant(&self, name: &str) -> Option<ConstantInfo> {
        self.constants.get(name).cloned()
    }

    fn lookup_function(&self, name: &str) -> Option<FunctionInfo> {
        self.functions.get(name).cloned()
    }

    fn lookup_struct(&self, name: &str) -> Option<String> {
        self.structs.get(name).cloned()
    }

    fn lookup_enum(&self, name: &str) -> Option<i64> {
        self.enums.get(name).copied()
    }
}

/// What a name resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A runtime class
    Class(Class),
    /// A constant's value
    Constant(Value),
    /// An enum member
    Enum(i64),
    /// A free function
    Function(ForeignFunction),
}

impl RuntimeContext {
    /// Adds a metadata source. Later sources do not shadow earlier ones.
    pub fn add_metadata(&self, source: impl MetadataSource + 'static) {
        debug!("metadata for {} added", source.library());
        self.inner().sources.borrow_mut().push(Box::new(source));
    }

    /// Resolves a global name: classes first (published, then runtime), then
    /// constants, enums and functions from the metadata sources.
    ///
    /// Results are memoized per name.
    ///
    /// # Errors
    ///
    /// - [`Error::UnresolvedName`] if nothing knows the name
    /// - [`Error::SymbolNotFound`] if metadata describes a constant or
    ///   function whose symbol is not in any loaded library
    /// - translation errors for the described encodings
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        if let Some(found) = self.inner().resolved.borrow().get(name) {
            return Ok(found.clone());
        }
        let found = self.resolve_uncached(name)?;
        trace!("resolved {name} -> {found:?}");
        self.inner()
            .resolved
            .borrow_mut()
            .insert(name.to_string(), found.clone());
        Ok(found)
    }

    fn resolve_uncached(&self, name: &str) -> Result<Resolved> {
        if let Some(class) = self.class(name)? {
            return Ok(Resolved::Class(class));
        }
        if let Some(info) = self.find_in_sources(|s| s.lookup_constant(name)) {
            return self.constant(name, &info).map(Resolved::Constant);
        }
        if let Some(value) = self.find_in_sources(|s| s.lookup_enum(name)) {
            return Ok(Resolved::Enum(value));
        }
        if let Some(info) = self.find_in_sources(|s| s.lookup_function(name)) {
            let signature = self.function_signature(&info.ret, &info.args)?;
            let address = self.symbol(name).ok_or_else(|| Error::SymbolNotFound { symbol: name.to_string() })?;
            // SAFETY: the metadata describes the exported symbol's signature
            let function = unsafe { ForeignFunction::new(name, address, signature) };
            return Ok(Resolved::Function(function));
        }
        Err(Error::UnresolvedName { name: name.to_string() })
    }

    fn find_in_sources<T>(&self, lookup: impl Fn(&dyn MetadataSource) -> Option<T>) -> Option<T> {
        self.inner().sources.borrow().iter().find_map(|s| lookup(s.as_ref()))
    }

    fn constant(&self, name: &str, info: &ConstantInfo) -> Result<Value> {
        let descriptor = self.translate(&info.encoding)?;
        let mut slot = marshal::slot(descriptor.size());
        let bytes = marshal::bytes_mut(&mut slot);
        match &info.value {
            Some(value) => {
                let n = value.len().min(bytes.len());
                bytes[..n].copy_from_slice(&value[..n]);
            }
            None => {
                let address = self.symbol(name).ok_or_else(|| Error::SymbolNotFound { symbol: name.to_string() })?;
                // SAFETY: the symbol holds a value of the described type
                unsafe { std::ptr::copy_nonoverlapping(address.cast::<u8>(), bytes.as_mut_ptr(), descriptor.size()) };
            }
        }
        // SAFETY: the bytes hold a value of the described type
        unsafe { marshal::decode(self, &descriptor, marshal::bytes(&slot)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_metadata_lookups() {
        let meta = StaticMetadata::new("libtest")
            .with_constant("kAnswer", "i", 42i32.to_ne_bytes())
            .with_symbol_constant("kExported", "d")
            .with_function("add", "i", ["i", "i"])
            .with_struct("Size", "{Size=dd}")
            .with_enum("ModeFast", 3);

        assert_eq!(meta.library(), "libtest");
        assert_eq!(
            meta.lookup_constant("kAnswer"),
            Some(ConstantInfo {
                encoding: "i".into(),
                value: Some(42i32.to_ne_bytes().to_vec()),
            })
        );
        assert_eq!(meta.lookup_constant("kExported").and_then(|c| c.value), None);
        assert_eq!(meta.lookup_function("add").map(|f| f.args.len()), Some(2));
        assert_eq!(meta.lookup_struct("Size").as_deref(), Some("{Size=dd}"));
        assert_eq!(meta.lookup_enum("ModeFast"), Some(3));
        assert_eq!(meta.lookup_enum("ModeSlow"), None);
    }
}
