//! One wrapper per native object.
//!
//! The cache is backed by the runtime's associated storage: the first time
//! a handle is wrapped, the wrapper's shared state is attached to the object
//! under a key unique to the context. Later wraps read it back, so two
//! wrappers for the same address are always the same wrapper.
//!
//! Entries are never evicted while the context lives. A runtime that drops
//! associations when it deallocates an object (the builtin one does) makes
//! the stale entry unreachable; if the address is reused, the new object gets
//! a fresh wrapper and the old one is released. Dropping the context
//! releases every wrapper it still tracks.

use super::api::{ASSOCIATION_ASSIGN, RawId};
use super::context::RuntimeContext;
use super::class::Class;
use super::object::{Id, IdInner, ObjectKind};
use fxhash::FxHashMap;
use oxbridge_log::{error, trace};
use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

pub(crate) struct IdentityCache {
    key: *const c_void,
    tracked: RefCell<FxHashMap<usize, *const IdInner>>,
}

impl IdentityCache {
    pub(crate) fn new() -> Self {
        // the key only needs an address no other context will ever use
        let key: &'static u8 = Box::leak(Box::new(0));
        IdentityCache {
            key: std::ptr::from_ref(key).cast(),
            tracked: RefCell::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// Remembers `inner` for its handle, releasing a wrapper it replaces.
    fn track(&self, inner: &Rc<IdInner>) -> *const IdInner {
        let raw = Rc::into_raw(Rc::clone(inner));
        if let Some(previous) = self.tracked.borrow_mut().insert(inner.handle, raw) {
            // SAFETY: every tracked pointer came from Rc::into_raw above
            drop(unsafe { Rc::from_raw(previous) });
        }
        raw
    }

    /// The cached wrapper for `handle`, if the association points at one we track.
    fn cached(&self, handle: usize, stored: *const IdInner) -> Option<Rc<IdInner>> {
        if stored.is_null() || self.tracked.borrow().get(&handle) != Some(&stored) {
            return None;
        }
        // SAFETY: tracked pointers hold a strong count until the cache drops
        let inner = unsafe {
            Rc::increment_strong_count(stored);
            Rc::from_raw(stored)
        };
        if inner.handle == handle {
            Some(inner)
        } else {
            error!("identity cache entry for {handle:#x} belongs to {:#x}", inner.handle);
            None
        }
    }
}

impl Drop for IdentityCache {
    fn drop(&mut self) {
        for (_, raw) in self.tracked.get_mut().drain() {
            // SAFETY: every tracked pointer came from Rc::into_raw
            drop(unsafe { Rc::from_raw(raw) });
        }
    }
}

impl RuntimeContext {
    /// Wraps a native object handle. Null yields `None`.
    ///
    /// Wrapping the same address twice returns the same wrapper
    /// (`Id::ptr_eq` holds).
    pub fn wrap(&self, handle: RawId) -> Option<Id> {
        if handle.is_null() {
            return None;
        }
        let api = self.api();
        let cache = &self.inner().identity;
        let address = handle as usize;

        // SAFETY: handle is a live runtime object
        let stored = unsafe { (api.get_associated_object)(handle, cache.key) };
        if let Some(inner) = cache.cached(address, stored.cast_const().cast()) {
            return Some(Id::from_inner(inner));
        }

        // SAFETY: see above
        let kind = unsafe {
            let cls = (api.object_get_class)(handle);
            if !cls.is_null() && (api.class_is_meta_class)(cls) {
                ObjectKind::Class
            } else {
                ObjectKind::Instance
            }
        };
        let inner = Rc::new(IdInner { handle: address, kind });
        let raw = cache.track(&inner);
        // SAFETY: see above; the stored pointer stays valid while tracked
        unsafe { (api.set_associated_object)(handle, cache.key, raw.cast_mut().cast(), ASSOCIATION_ASSIGN) };
        trace!("wrapped {address:#x} as {kind:?}");
        Some(Id::from_inner(inner))
    }

    /// Wraps a class handle. Null and non-class handles yield `None`.
    pub fn wrap_class(&self, handle: RawId) -> Option<Class> {
        self.wrap(handle).and_then(|id| Class::try_from(id).ok())
    }

    /// Number of wrappers the identity cache holds.
    pub fn cached_wrappers(&self) -> usize {
        self.inner().identity.len()
    }
}
