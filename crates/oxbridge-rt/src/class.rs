//! Classes, metaclasses and their method and ivar tables.
//!
//! Every class is allocated as a pair: the class itself and its metaclass,
//! which holds the class-side methods. Metaclasses follow the usual
//! convention: a metaclass's `isa` is the root metaclass, and the root
//! metaclass's superclass is the root class, so class-side lookups fall back
//! to root instance methods.
//!
//! Classes are leaked and live for the rest of the process. A class pair is
//! visible to `objc_get_class` only after `objc_register_class_pair`; ivars
//! can only be added before that point, methods at any time.
//!
//! # Thread Safety
//!
//! The registry and every per-class table sit behind `RwLock`s. The IMP cache
//! is invalidated through a global epoch bumped on every method-table change.

use crate::abi::{RawClass, RawImp, RawIvar, RawMethod, RawSel, imp_addr, imp_from_addr};
use crate::memory;
use crate::protocol::ProtocolInner;
use crate::root;
use crate::selector;
use fxhash::FxHashMap;
use oxbridge_log::{debug, trace};
use std::ffi::{CStr, CString, c_char, c_int, c_uint};
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{OnceLock, RwLock};

const STATE_ALLOCATED: u8 = 0;
const STATE_REGISTERED: u8 = 1;

/// Bumped whenever any method table or implementation changes.
static CACHE_EPOCH: AtomicU64 = AtomicU64::new(0);

pub(crate) fn invalidate_caches() {
    CACHE_EPOCH.fetch_add(1, Ordering::AcqRel);
}

/// A method: selector, type encoding and a swappable implementation.
pub(crate) struct MethodInner {
    pub(crate) name: usize,
    pub(crate) types: CString,
    pub(crate) imp: AtomicUsize,
}

impl MethodInner {
    pub(crate) fn selector(&self) -> RawSel {
        self.name as RawSel
    }

    pub(crate) fn imp(&self) -> RawImp {
        imp_from_addr(self.imp.load(Ordering::Acquire))
    }
}

/// An instance variable with its computed byte offset.
pub(crate) struct IvarInner {
    pub(crate) name: CString,
    pub(crate) types: CString,
    pub(crate) offset: isize,
    pub(crate) size: usize,
}

struct ImpCache {
    epoch: u64,
    imps: FxHashMap<usize, usize>,
}

/// Class data. `isa` must stay the first field: a class is itself an object.
#[repr(C)]
pub(crate) struct ClassInner {
    pub(crate) isa: *mut ClassInner,
    superclass: AtomicPtr<ClassInner>,
    pub(crate) name: CString,
    pub(crate) meta: bool,
    state: AtomicU8,
    instance_size: AtomicUsize,
    version: AtomicI32,
    methods: RwLock<Vec<&'static MethodInner>>,
    ivars: RwLock<Vec<&'static IvarInner>>,
    pub(crate) protocols: RwLock<Vec<&'static ProtocolInner>>,
    ivar_layout: RwLock<Option<&'static CStr>>,
    weak_ivar_layout: RwLock<Option<&'static CStr>>,
    /// Zeroed storage of the `extra_bytes` given at allocation, or null.
    pub(crate) indexed_ivars: *mut u8,
    cache: RwLock<ImpCache>,
}

// SAFETY: `isa` only ever references another leaked `ClassInner` and is
// written once before the class becomes reachable. `indexed_ivars` is owned
// by the class for the rest of the process. All other mutable state is
// behind locks or atomics.
unsafe impl Send for ClassInner {}
unsafe impl Sync for ClassInner {}

impl ClassInner {
    fn new(name: CString, superclass: *mut ClassInner, meta: bool, instance_size: usize, extra_bytes: usize) -> Self {
        let indexed_ivars = if extra_bytes == 0 {
            std::ptr::null_mut()
        } else {
            // SAFETY: plain allocation, null on failure
            unsafe { libc::calloc(1, extra_bytes) }.cast()
        };
        ClassInner {
            isa: std::ptr::null_mut(),
            superclass: AtomicPtr::new(superclass),
            name,
            meta,
            state: AtomicU8::new(STATE_ALLOCATED),
            instance_size: AtomicUsize::new(instance_size),
            version: AtomicI32::new(0),
            methods: RwLock::new(Vec::new()),
            ivars: RwLock::new(Vec::new()),
            protocols: RwLock::new(Vec::new()),
            ivar_layout: RwLock::new(None),
            weak_ivar_layout: RwLock::new(None),
            indexed_ivars,
            cache: RwLock::new(ImpCache {
                epoch: u64::MAX,
                imps: FxHashMap::default(),
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.name.to_str().unwrap_or("?")
    }

    pub(crate) fn superclass(&self) -> Option<&'static ClassInner> {
        // SAFETY: superclass pointers reference leaked classes or are null
        unsafe { self.superclass.load(Ordering::Acquire).as_ref() }
    }

    pub(crate) fn metaclass(&self) -> &'static ClassInner {
        // SAFETY: isa is set before a class becomes reachable
        unsafe { &*self.isa }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_REGISTERED
    }

    pub(crate) fn instance_size(&self) -> usize {
        self.instance_size.load(Ordering::Acquire)
    }

    pub(crate) fn as_raw(&self) -> RawClass {
        std::ptr::from_ref(self).cast_mut().cast()
    }

    /// Iterates this class followed by each of its superclasses.
    pub(crate) fn chain(&'static self) -> impl Iterator<Item = &'static ClassInner> {
        std::iter::successors(Some(self), |cls| cls.superclass())
    }

    pub(crate) fn own_method(&self, sel: RawSel) -> Option<&'static MethodInner> {
        let methods = self.methods.read().ok()?;
        methods.iter().copied().find(|m| m.name == sel as usize)
    }

    pub(crate) fn find_method(&'static self, sel: RawSel) -> Option<&'static MethodInner> {
        self.chain().find_map(|cls| cls.own_method(sel))
    }

    /// Cached implementation lookup along the superclass chain.
    pub(crate) fn lookup_imp(&'static self, sel: RawSel) -> RawImp {
        let epoch = CACHE_EPOCH.load(Ordering::Acquire);

        if let Ok(cache) = self.cache.read() {
            if cache.epoch == epoch {
                if let Some(&addr) = cache.imps.get(&(sel as usize)) {
                    return imp_from_addr(addr);
                }
            }
        }

        let imp = self.find_method(sel)?.imp();
        if let Ok(mut cache) = self.cache.write() {
            if cache.epoch != epoch {
                cache.imps.clear();
                cache.epoch = epoch;
            }
            cache.imps.insert(sel as usize, imp_addr(imp));
        }
        imp
    }

    pub(crate) fn find_ivar(&'static self, name: &str) -> Option<&'static IvarInner> {
        self.chain().find_map(|cls| {
            let ivars = cls.ivars.read().ok()?;
            ivars.iter().copied().find(|ivar| ivar.name.to_bytes() == name.as_bytes())
        })
    }

    /// Adds a method unless this class already defines one for `sel`.
    pub(crate) fn add_method(&self, sel: RawSel, imp: RawImp, types: &str) -> bool {
        if sel.is_null() || imp.is_none() {
            return false;
        }
        let Ok(types) = CString::new(types) else {
            return false;
        };
        let Ok(mut methods) = self.methods.write() else {
            return false;
        };
        if methods.iter().any(|m| m.name == sel as usize) {
            return false;
        }
        methods.push(Box::leak(Box::new(MethodInner {
            name: sel as usize,
            types,
            imp: AtomicUsize::new(imp_addr(imp)),
        })));
        drop(methods);
        invalidate_caches();
        true
    }

    pub(crate) fn add_ivar(&self, name: &str, size: usize, log2_align: u8, types: &str) -> bool {
        if self.meta || self.is_registered() || size == 0 || log2_align >= 16 {
            return false;
        }
        let (Ok(c_name), Ok(c_types)) = (CString::new(name), CString::new(types)) else {
            return false;
        };
        let Ok(mut ivars) = self.ivars.write() else {
            return false;
        };
        if ivars.iter().any(|ivar| ivar.name == c_name) {
            return false;
        }

        let align = 1usize << log2_align;
        let offset = self.instance_size().next_multiple_of(align);
        let Ok(signed_offset) = isize::try_from(offset) else {
            return false;
        };
        self.instance_size.store(offset + size, Ordering::Release);
        ivars.push(Box::leak(Box::new(IvarInner {
            name: c_name,
            types: c_types,
            offset: signed_offset,
            size,
        })));
        true
    }

    pub(crate) fn methods(&self) -> Vec<&'static MethodInner> {
        self.methods.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub(crate) fn ivars(&self) -> Vec<&'static IvarInner> {
        self.ivars.read().map(|i| i.clone()).unwrap_or_default()
    }

    /// Moves the class (and its metaclass) under `superclass`, returning the
    /// previous superclass. Instance sizes and ivar offsets are not updated.
    pub(crate) fn set_superclass(&'static self, superclass: &'static ClassInner) -> Option<&'static ClassInner> {
        if self.meta || superclass.meta || superclass.chain().any(|cls| std::ptr::eq(cls, self)) {
            return None;
        }
        let previous = self
            .superclass
            .swap(std::ptr::from_ref(superclass).cast_mut(), Ordering::AcqRel);
        self.metaclass()
            .superclass
            .store(superclass.isa, Ordering::Release);
        invalidate_caches();
        debug!("{} now inherits from {}", self.name(), superclass.name());
        // SAFETY: superclass pointers reference leaked classes or are null
        unsafe { previous.as_ref() }
    }

    pub(crate) fn ivar_layout(&self, weak: bool) -> Option<&'static CStr> {
        let slot = if weak { &self.weak_ivar_layout } else { &self.ivar_layout };
        slot.read().ok().and_then(|layout| *layout)
    }

    /// Stores a copy of `layout`. Replaced layouts stay allocated.
    pub(crate) fn set_ivar_layout(&self, weak: bool, layout: Option<&CStr>) -> bool {
        if self.is_registered() {
            return false;
        }
        let slot = if weak { &self.weak_ivar_layout } else { &self.ivar_layout };
        let Ok(mut current) = slot.write() else {
            return false;
        };
        *current = layout.map(|l| &*Box::leak(l.to_owned().into_boxed_c_str()));
        true
    }
}

/// Resolves a raw class handle.
///
/// # Safety
///
/// `cls` must be null or a class returned by this runtime.
pub(crate) unsafe fn class_ref(cls: RawClass) -> Option<&'static ClassInner> {
    // SAFETY: classes are leaked `ClassInner`s
    unsafe { cls.cast::<ClassInner>().as_ref() }
}

pub(crate) fn method_raw(method: &'static MethodInner) -> RawMethod {
    std::ptr::from_ref(method).cast_mut().cast()
}

pub(crate) fn ivar_raw(ivar: &'static IvarInner) -> RawIvar {
    std::ptr::from_ref(ivar).cast_mut().cast()
}

/// Reads a C string argument, rejecting null and non UTF-8 input.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller contract
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ============================================================================
// Class Registry
// ============================================================================

struct ClassRegistry {
    classes: RwLock<FxHashMap<Box<str>, &'static ClassInner>>,
}

static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

fn registry() -> &'static ClassRegistry {
    REGISTRY.get_or_init(|| ClassRegistry {
        classes: RwLock::new(FxHashMap::default()),
    })
}

/// Finds a registered class by name.
pub(crate) fn lookup(name: &str) -> Option<&'static ClassInner> {
    let classes = registry().classes.read().ok()?;
    classes.get(name).copied().filter(|cls| cls.is_registered())
}

fn registered_classes() -> Vec<&'static ClassInner> {
    registry()
        .classes
        .read()
        .map(|classes| classes.values().copied().filter(|cls| cls.is_registered()).collect())
        .unwrap_or_default()
}

/// Allocates a class pair. Fails if `name` is taken or `superclass` is a metaclass.
///
/// Both the class and its metaclass get `extra_bytes` of indexed storage.
pub(crate) fn allocate_pair(
    superclass: Option<&'static ClassInner>,
    name: &str,
    extra_bytes: usize,
) -> Option<&'static ClassInner> {
    if superclass.is_some_and(|s| s.meta) {
        return None;
    }
    let c_name = CString::new(name).ok()?;
    let mut classes = registry().classes.write().ok()?;
    if classes.contains_key(name) {
        debug!("class name {name} is already taken");
        return None;
    }

    let super_ptr = superclass.map_or(std::ptr::null_mut(), |s| std::ptr::from_ref(s).cast_mut());
    let super_meta = superclass.map_or(std::ptr::null_mut(), |s| s.isa);
    let instance_size = superclass.map_or(0, ClassInner::instance_size);

    let meta = Box::into_raw(Box::new(ClassInner::new(c_name.clone(), super_meta, true, 0, extra_bytes)));
    let cls = Box::into_raw(Box::new(ClassInner::new(c_name, super_ptr, false, instance_size, extra_bytes)));

    // SAFETY: both pointers are fresh, unaliased allocations
    unsafe {
        (*cls).isa = meta;
        match superclass {
            Some(parent) => (*meta).isa = parent.metaclass().isa,
            None => {
                (*meta).isa = meta;
                *(*meta).superclass.get_mut() = cls;
            }
        }
    }

    // SAFETY: leaked for the rest of the process
    let cls: &'static ClassInner = unsafe { &*cls };
    classes.insert(name.into(), cls);
    debug!("allocated class pair {name}");
    Some(cls)
}

pub(crate) fn register_pair(cls: &'static ClassInner) {
    cls.metaclass().state.store(STATE_REGISTERED, Ordering::Release);
    cls.state.store(STATE_REGISTERED, Ordering::Release);
    debug!("registered class {}", cls.name());
}

// ============================================================================
// Exported API
// ============================================================================

/// Returns the registered class called `name`, or null.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
pub unsafe extern "C" fn objc_get_class(name: *const c_char) -> RawClass {
    root::ensure_installed();
    // SAFETY: caller contract
    let Some(name) = (unsafe { c_str(name) }) else {
        return std::ptr::null_mut();
    };
    lookup(name).map_or(std::ptr::null_mut(), ClassInner::as_raw)
}

/// Count-then-fill enumeration of registered classes.
///
/// Returns the total number of classes and writes up to `buffer_count`
/// of them into `buffer` when it is non-null.
///
/// # Safety
///
/// `buffer` must be null or valid for `buffer_count` writes.
pub unsafe extern "C" fn objc_get_class_list(buffer: *mut RawClass, buffer_count: c_int) -> c_int {
    root::ensure_installed();
    let classes = registered_classes();
    if !buffer.is_null() {
        let capacity = usize::try_from(buffer_count).unwrap_or(0);
        for (i, cls) in classes.iter().take(capacity).enumerate() {
            // SAFETY: i < buffer_count
            unsafe { *buffer.add(i) = cls.as_raw() };
        }
    }
    c_int::try_from(classes.len()).unwrap_or(c_int::MAX)
}

/// Returns a `malloc`'d array of all registered classes.
///
/// # Safety
///
/// `out_count` must be null or valid for a write.
pub unsafe extern "C" fn objc_copy_class_list(out_count: *mut c_uint) -> *mut RawClass {
    root::ensure_installed();
    let classes: Vec<RawClass> = registered_classes().into_iter().map(ClassInner::as_raw).collect();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&classes, out_count) }
}

/// Allocates a new class pair below `superclass` (null for a new root).
///
/// `extra_bytes` of zeroed storage are attached to the class and metaclass
/// objects; see [`object_get_indexed_ivars`](crate::object_get_indexed_ivars).
///
/// # Safety
///
/// `superclass` must be null or a class of this runtime; `name` a valid C string.
pub unsafe extern "C" fn objc_allocate_class_pair(
    superclass: RawClass,
    name: *const c_char,
    extra_bytes: usize,
) -> RawClass {
    root::ensure_installed();
    // SAFETY: caller contract
    let (parent, name) = unsafe { (class_ref(superclass), c_str(name)) };
    let Some(name) = name else {
        return std::ptr::null_mut();
    };
    if !superclass.is_null() && parent.is_none() {
        return std::ptr::null_mut();
    }
    trace!("allocate {name} (extra bytes: {extra_bytes})");
    allocate_pair(parent, name, extra_bytes).map_or(std::ptr::null_mut(), ClassInner::as_raw)
}

/// Makes an allocated class pair visible to lookups.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn objc_register_class_pair(cls: RawClass) {
    // SAFETY: caller contract
    if let Some(cls) = unsafe { class_ref(cls) } {
        if !cls.meta {
            register_pair(cls);
        }
    }
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_name(cls: RawClass) -> *const c_char {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }.map_or(c"nil".as_ptr(), |cls| cls.name.as_ptr())
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_superclass(cls: RawClass) -> RawClass {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }
        .and_then(ClassInner::superclass)
        .map_or(std::ptr::null_mut(), ClassInner::as_raw)
}

/// Reparents `cls` under `superclass` and returns the previous superclass.
///
/// Returns null and leaves the hierarchy alone when either argument is null
/// or a metaclass, or when the move would create a cycle.
///
/// # Safety
///
/// Both arguments must be null or classes of this runtime.
pub unsafe extern "C" fn class_set_superclass(cls: RawClass, superclass: RawClass) -> RawClass {
    // SAFETY: caller contract
    let (cls, superclass) = unsafe { (class_ref(cls), class_ref(superclass)) };
    match (cls, superclass) {
        (Some(cls), Some(superclass)) => cls
            .set_superclass(superclass)
            .map_or(std::ptr::null_mut(), ClassInner::as_raw),
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_is_meta_class(cls: RawClass) -> bool {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }.is_some_and(|cls| cls.meta)
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_instance_size(cls: RawClass) -> usize {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }.map_or(0, ClassInner::instance_size)
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_version(cls: RawClass) -> c_int {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }.map_or(0, |cls| cls.version.load(Ordering::Acquire))
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_set_version(cls: RawClass, version: c_int) {
    // SAFETY: caller contract
    if let Some(cls) = unsafe { class_ref(cls) } {
        cls.version.store(version, Ordering::Release);
    }
}

/// Adds a method. Returns false if the class already defines `sel` itself.
///
/// # Safety
///
/// `cls` must be a class of this runtime, `sel` a selector of this runtime
/// and `types` a valid C string.
pub unsafe extern "C" fn class_add_method(
    cls: RawClass,
    sel: RawSel,
    imp: RawImp,
    types: *const c_char,
) -> bool {
    // SAFETY: caller contract
    let (Some(cls), Some(types)) = (unsafe { class_ref(cls) }, unsafe { c_str(types) }) else {
        return false;
    };
    let added = cls.add_method(sel, imp, types);
    if added {
        // SAFETY: sel was accepted by add_method, so it is a runtime selector
        let name = unsafe { selector::name_of(sel) }.unwrap_or("?");
        trace!("{}[{} {name}] {types}", if cls.meta { "+" } else { "-" }, cls.name());
    }
    added
}

/// Adds or replaces a method, returning the previous implementation if any.
///
/// # Safety
///
/// Same as [`class_add_method`].
pub unsafe extern "C" fn class_replace_method(
    cls: RawClass,
    sel: RawSel,
    imp: RawImp,
    types: *const c_char,
) -> RawImp {
    // SAFETY: caller contract
    let Some(inner) = (unsafe { class_ref(cls) }) else {
        return None;
    };
    if let Some(existing) = inner.own_method(sel) {
        let previous = existing.imp.swap(imp_addr(imp), Ordering::AcqRel);
        invalidate_caches();
        return imp_from_addr(previous);
    }
    // SAFETY: caller contract
    unsafe { class_add_method(cls, sel, imp, types) };
    None
}

/// Adds an instance variable to a class that has not been registered yet.
///
/// # Safety
///
/// `cls` must be a class of this runtime; `name` and `types` valid C strings.
pub unsafe extern "C" fn class_add_ivar(
    cls: RawClass,
    name: *const c_char,
    size: usize,
    log2_alignment: u8,
    types: *const c_char,
) -> bool {
    // SAFETY: caller contract
    let (cls, name, types) = unsafe { (class_ref(cls), c_str(name), c_str(types)) };
    match (cls, name, types) {
        (Some(cls), Some(name), Some(types)) => cls.add_ivar(name, size, log2_alignment, types),
        _ => false,
    }
}

/// Returns a `malloc`'d array of the methods defined directly on `cls`.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `out_count` null or writable.
pub unsafe extern "C" fn class_copy_method_list(cls: RawClass, out_count: *mut c_uint) -> *mut RawMethod {
    // SAFETY: caller contract
    let methods: Vec<RawMethod> = unsafe { class_ref(cls) }
        .map(|cls| cls.methods().into_iter().map(method_raw).collect())
        .unwrap_or_default();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&methods, out_count) }
}

/// Returns a `malloc`'d array of the ivars declared directly on `cls`.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `out_count` null or writable.
pub unsafe extern "C" fn class_copy_ivar_list(cls: RawClass, out_count: *mut c_uint) -> *mut RawIvar {
    // SAFETY: caller contract
    let ivars: Vec<RawIvar> = unsafe { class_ref(cls) }
        .map(|cls| cls.ivars().into_iter().map(ivar_raw).collect())
        .unwrap_or_default();
    // SAFETY: caller contract
    unsafe { memory::copy_list(&ivars, out_count) }
}

/// Finds an instance method of `cls` or one of its superclasses.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_instance_method(cls: RawClass, sel: RawSel) -> RawMethod {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }
        .and_then(|cls| cls.find_method(sel))
        .map_or(std::ptr::null_mut(), method_raw)
}

/// Finds a class method of `cls` (an instance method of its metaclass).
///
/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_class_method(cls: RawClass, sel: RawSel) -> RawMethod {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }
        .and_then(|cls| cls.metaclass().find_method(sel))
        .map_or(std::ptr::null_mut(), method_raw)
}

/// Finds an ivar by name along the superclass chain.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `name` null or a valid C string.
pub unsafe extern "C" fn class_get_instance_variable(cls: RawClass, name: *const c_char) -> RawIvar {
    // SAFETY: caller contract
    let (cls, name) = unsafe { (class_ref(cls), c_str(name)) };
    match (cls, name) {
        (Some(cls), Some(name)) => cls.find_ivar(name).map_or(std::ptr::null_mut(), ivar_raw),
        _ => std::ptr::null_mut(),
    }
}

/// Finds an ivar of the class object itself, searching the metaclass chain.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `name` null or a valid C string.
pub unsafe extern "C" fn class_get_class_variable(cls: RawClass, name: *const c_char) -> RawIvar {
    // SAFETY: caller contract
    let (cls, name) = unsafe { (class_ref(cls), c_str(name)) };
    match (cls, name) {
        (Some(cls), Some(name)) => cls
            .metaclass()
            .find_ivar(name)
            .map_or(std::ptr::null_mut(), ivar_raw),
        _ => std::ptr::null_mut(),
    }
}

unsafe fn get_layout(cls: RawClass, weak: bool) -> *const u8 {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }
        .and_then(|cls| cls.ivar_layout(weak))
        .map_or(std::ptr::null(), |layout| layout.as_ptr().cast())
}

unsafe fn set_layout(cls: RawClass, layout: *const u8, weak: bool) {
    // SAFETY: caller contract
    let Some(cls) = (unsafe { class_ref(cls) }) else {
        return;
    };
    // SAFETY: caller contract
    let layout = (!layout.is_null()).then(|| unsafe { CStr::from_ptr(layout.cast()) });
    if !cls.set_ivar_layout(weak, layout) {
        debug!("ignoring ivar layout for registered class {}", cls.name());
    }
}

/// Returns the strong ivar layout of `cls`, or null when none was set.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_ivar_layout(cls: RawClass) -> *const u8 {
    // SAFETY: caller contract
    unsafe { get_layout(cls, false) }
}

/// Sets the strong ivar layout of a class that is not registered yet.
/// A null `layout` clears it.
///
/// # Safety
///
/// `cls` must be null or a class of this runtime; `layout` null or a
/// NUL-terminated byte string.
pub unsafe extern "C" fn class_set_ivar_layout(cls: RawClass, layout: *const u8) {
    // SAFETY: caller contract
    unsafe { set_layout(cls, layout, false) }
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_get_weak_ivar_layout(cls: RawClass) -> *const u8 {
    // SAFETY: caller contract
    unsafe { get_layout(cls, true) }
}

/// # Safety
///
/// Same contract as [`class_set_ivar_layout`].
pub unsafe extern "C" fn class_set_weak_ivar_layout(cls: RawClass, layout: *const u8) {
    // SAFETY: caller contract
    unsafe { set_layout(cls, layout, true) }
}

/// # Safety
///
/// `cls` must be null or a class of this runtime.
pub unsafe extern "C" fn class_responds_to_selector(cls: RawClass, sel: RawSel) -> bool {
    // SAFETY: caller contract
    unsafe { class_ref(cls) }.is_some_and(|cls| cls.find_method(sel).is_some())
}
