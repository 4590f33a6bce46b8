//! The runtime context: every table the bridge keeps, in one place.
//!
//! A [`RuntimeContext`] owns the function table of the runtime it drives,
//! the selector intern table, the identity cache, registered struct layouts,
//! cached call frames, metadata sources, loaded libraries and the memoized
//! results of [`RuntimeContext::resolve`]. Contexts are cheap to clone
//! (clones share state) and are not `Send`: the bridge assumes the
//! single-threaded, call-and-return model of the runtimes it talks to.

use super::api::RuntimeApi;
use super::call::CallFrame;
use super::class::Class;
use super::encoding::{AggregateLayout, MarshalDescriptor, Signature, Translator};
use super::identity::IdentityCache;
use super::library::NativeLibrary;
use super::marshal::Scratch;
use super::metadata::{MetadataSource, Resolved};
use super::selector::Sel;
use crate::config::{Config, RuntimeSource};
use crate::error::{Error, Result};
use fxhash::FxHashMap;
use oxbridge_log::{debug, warn};
use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// How many nested struct names one translation may pull from metadata.
const MAX_STRUCT_LOOKUPS: usize = 16;

pub(crate) struct ContextInner {
    pub(crate) api: RuntimeApi,
    pub(crate) config: Config,
    pub(crate) selectors: RefCell<FxHashMap<String, Sel>>,
    pub(crate) identity: IdentityCache,
    pub(crate) translator: RefCell<Translator>,
    pub(crate) frames: RefCell<FxHashMap<String, Rc<CallFrame>>>,
    pub(crate) resolved: RefCell<FxHashMap<String, Resolved>>,
    pub(crate) sources: RefCell<Vec<Box<dyn MetadataSource>>>,
    pub(crate) libraries: RefCell<Vec<NativeLibrary>>,
    pub(crate) published: RefCell<FxHashMap<String, Class>>,
    pub(crate) pending_error: RefCell<Option<Error>>,
    pub(crate) retained: RefCell<Scratch>,
}

/// Shared handle to the bridge state for one runtime.
#[derive(Clone)]
pub struct RuntimeContext {
    inner: Rc<ContextInner>,
}

impl RuntimeContext {
    /// Builds a context from `config`.
    ///
    /// Applies `config.log` to the global logger, then loads the runtime.
    ///
    /// # Errors
    ///
    /// Fails if the runtime library cannot be opened or lacks a required
    /// symbol, or if the builtin runtime was requested but not compiled in.
    pub fn new(config: Config) -> Result<Self> {
        if let Some(directives) = &config.log {
            if let Err(e) = oxbridge_log::set_directives(directives) {
                warn!("ignoring log directives {directives:?}: {e}");
            }
        }

        match config.runtime.clone() {
            RuntimeSource::Builtin => Self::builtin_api().map(|api| Self::with_api(api, config)),
            RuntimeSource::Library(path) => {
                let library = NativeLibrary::open(&path)?;
                // SAFETY: a runtime library exports the C API under the standard names
                let api = unsafe { RuntimeApi::from_library(&library)? };
                let ctx = Self::with_api(api, config);
                ctx.add_library(library);
                Ok(ctx)
            }
        }
    }

    #[cfg(feature = "builtin-runtime")]
    fn builtin_api() -> Result<RuntimeApi> {
        Ok(RuntimeApi::builtin())
    }

    #[cfg(not(feature = "builtin-runtime"))]
    fn builtin_api() -> Result<RuntimeApi> {
        Err(Error::Library {
            path: "builtin".into(),
            reason: "built without the `builtin-runtime` feature".into(),
        })
    }

    /// A context over the bundled runtime with the default configuration.
    #[cfg(feature = "builtin-runtime")]
    pub fn builtin() -> Self {
        Self::with_api(RuntimeApi::builtin(), Config::default())
    }

    /// A context over an explicit function table.
    pub fn with_api(api: RuntimeApi, config: Config) -> Self {
        debug!("new runtime context (fallback: {:?})", config.fallback);
        RuntimeContext {
            inner: Rc::new(ContextInner {
                api,
                config,
                selectors: RefCell::default(),
                identity: IdentityCache::new(),
                translator: RefCell::default(),
                frames: RefCell::default(),
                resolved: RefCell::default(),
                sources: RefCell::default(),
                libraries: RefCell::default(),
                published: RefCell::default(),
                pending_error: RefCell::default(),
                retained: RefCell::default(),
            }),
        }
    }

    /// The runtime function table.
    pub fn api(&self) -> &RuntimeApi {
        &self.inner.api
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &ContextInner {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ContextInner>) -> Option<Self> {
        weak.upgrade().map(|inner| RuntimeContext { inner })
    }

    /// True if both handles share the same state.
    pub fn same_context(&self, other: &RuntimeContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Makes `library` available for symbol resolution.
    pub fn add_library(&self, library: NativeLibrary) {
        debug!("library {} added", library.name());
        self.inner.libraries.borrow_mut().push(library);
    }

    /// Opens the library at `path` and adds it.
    ///
    /// # Errors
    ///
    /// See [`NativeLibrary::open`].
    pub fn load_library(&self, path: &str) -> Result<NativeLibrary> {
        let library = NativeLibrary::open(path)?;
        self.add_library(library);
        Ok(library)
    }

    /// Finds `symbol` in the loaded libraries, most recent first.
    pub fn symbol(&self, symbol: &str) -> Option<*mut std::ffi::c_void> {
        self.inner.libraries.borrow().iter().rev().find_map(|lib| lib.symbol(symbol))
    }

    // ------------------------------------------------------------------
    // Struct layouts and translation
    // ------------------------------------------------------------------

    /// Parses a struct encoding and registers its layout for `{Name}`
    /// references and pointer decoding.
    ///
    /// # Errors
    ///
    /// Fails if `encoding` is not a well-formed struct encoding.
    pub fn register_struct(&self, encoding: &str) -> Result<Arc<AggregateLayout>> {
        let descriptor = self.translate(encoding)?;
        match descriptor.layout() {
            Some(layout) if descriptor.kind() == super::encoding::MarshalKind::Aggregate => {
                debug!("struct {} registered ({} bytes)", layout.name(), layout.size());
                self.inner.translator.borrow_mut().insert(Arc::clone(layout));
                Ok(Arc::clone(layout))
            }
            _ => Err(Error::MalformedEncoding {
                encoding: encoding.to_string(),
                reason: "expected a struct encoding".into(),
            }),
        }
    }

    /// Layout registered under `name`.
    pub fn struct_layout(&self, name: &str) -> Option<Arc<AggregateLayout>> {
        self.inner.translator.borrow().layout(name)
    }

    /// Runs `f` against the translator, loading unknown struct names from
    /// the metadata sources and retrying.
    fn with_structs<T>(&self, f: impl Fn(&Translator) -> Result<T>) -> Result<T> {
        let mut lookups = 0;
        loop {
            let result = f(&self.inner.translator.borrow());
            match result {
                Err(Error::UnknownAggregate { name }) if lookups < MAX_STRUCT_LOOKUPS => {
                    let encoding = self
                        .inner
                        .sources
                        .borrow()
                        .iter()
                        .find_map(|source| source.lookup_struct(&name));
                    let Some(encoding) = encoding else {
                        return Err(Error::UnknownAggregate { name });
                    };
                    self.register_struct(&encoding)?;
                    lookups += 1;
                }
                other => return other,
            }
        }
    }

    /// Translates one type encoding against the registered layouts.
    ///
    /// # Errors
    ///
    /// See [`Translator::translate`].
    pub fn translate(&self, encoding: &str) -> Result<MarshalDescriptor> {
        self.with_structs(|t| t.translate(encoding))
    }

    /// Parses a method type string against the registered layouts.
    ///
    /// # Errors
    ///
    /// See [`Translator::parse_signature`].
    pub fn parse_signature(&self, types: &str) -> Result<Signature> {
        self.with_structs(|t| t.parse_signature(types))
    }

    /// Translates a free function's return and argument encodings.
    pub(crate) fn function_signature(&self, ret: &str, args: &[String]) -> Result<Signature> {
        self.with_structs(|t| Ok(Signature::new(t.translate(ret)?, t.translate_sequence(args)?)))
    }

    /// Method signature from separately copied return and argument types.
    pub(crate) fn method_signature(&self, ret: &str, args: &[String]) -> Result<Signature> {
        self.with_structs(|t| t.signature_from_parts(ret, args))
    }

    // ------------------------------------------------------------------
    // Call frames
    // ------------------------------------------------------------------

    /// Returns the cached frame for `key`, building it from `signature` on a miss.
    pub(crate) fn frame(&self, key: &str, signature: impl FnOnce() -> Result<Signature>) -> Result<Rc<CallFrame>> {
        if let Some(frame) = self.inner.frames.borrow().get(key) {
            return Ok(Rc::clone(frame));
        }
        let frame = Rc::new(CallFrame::new(signature()?));
        self.inner
            .frames
            .borrow_mut()
            .insert(key.to_string(), Rc::clone(&frame));
        Ok(frame)
    }

    /// Number of distinct call shapes built so far.
    pub fn cached_frames(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    // ------------------------------------------------------------------
    // Errors raised inside callbacks
    // ------------------------------------------------------------------

    /// Records an error from a method implementation. The first error wins
    /// until the outermost dispatch collects it.
    pub(crate) fn set_pending_error(&self, error: Error) {
        let mut slot = self.inner.pending_error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub(crate) fn take_pending_error(&self) -> Option<Error> {
        self.inner.pending_error.borrow_mut().take()
    }

    /// Keeps storage handed to native code (returned strings, ivar values)
    /// alive for the context's lifetime.
    pub(crate) fn retain(&self, scratch: Scratch) {
        if !scratch.is_empty() {
            self.inner.retained.borrow_mut().absorb(scratch);
        }
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("api", &self.inner.api)
            .field("config", &self.inner.config)
            .field("selectors", &self.inner.selectors.borrow().len())
            .field("wrappers", &self.inner.identity.len())
            .field("frames", &self.inner.frames.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Converts `name` for the runtime.
pub(crate) fn c_string(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::InvalidName { name: name.to_string() })
}
