//! Selector interning.
//!
//! Each distinct name maps to exactly one leaked [`SelInner`], so selectors
//! compare by address. The registry is split into shards keyed by the name's
//! hash to keep lock contention low when several threads intern at once.

use crate::abi::RawSel;
use fxhash::{FxHashMap, FxHasher};
use std::ffi::{CStr, CString, c_char};
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, RwLock};

const NUM_SHARDS: usize = 16;
const SHARD_MASK: usize = NUM_SHARDS - 1;

/// Interned selector data. Never deallocated.
pub(crate) struct SelInner {
    pub(crate) name: CString,
}

struct SelectorRegistry {
    shards: Vec<RwLock<FxHashMap<Box<str>, &'static SelInner>>>,
}

impl SelectorRegistry {
    fn new() -> Self {
        SelectorRegistry {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(FxHashMap::default())).collect(),
        }
    }

    fn shard(&self, name: &str) -> &RwLock<FxHashMap<Box<str>, &'static SelInner>> {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let index = hasher.finish() as usize & SHARD_MASK;
        &self.shards[index]
    }

    fn intern(&self, name: &str) -> Option<&'static SelInner> {
        let shard = self.shard(name);

        if let Ok(guard) = shard.read() {
            if let Some(sel) = guard.get(name) {
                return Some(sel);
            }
        }

        let mut guard = shard.write().ok()?;
        // another thread may have won the race between the two locks
        if let Some(sel) = guard.get(name) {
            return Some(sel);
        }
        let inner: &'static SelInner = Box::leak(Box::new(SelInner {
            name: CString::new(name).ok()?,
        }));
        guard.insert(name.into(), inner);
        Some(inner)
    }
}

static REGISTRY: OnceLock<SelectorRegistry> = OnceLock::new();

fn registry() -> &'static SelectorRegistry {
    REGISTRY.get_or_init(SelectorRegistry::new)
}

/// Interns `name` from Rust code.
pub(crate) fn intern(name: &str) -> RawSel {
    registry()
        .intern(name)
        .map_or(std::ptr::null(), |sel| std::ptr::from_ref(sel).cast())
}

/// Returns the name of a selector produced by this module.
///
/// # Safety
///
/// `sel` must be null or a selector returned by [`intern`] / [`sel_register_name`].
pub(crate) unsafe fn name_of<'a>(sel: RawSel) -> Option<&'a str> {
    if sel.is_null() {
        return None;
    }
    // SAFETY: selectors are leaked `SelInner`s
    let inner = unsafe { &*sel.cast::<SelInner>() };
    inner.name.to_str().ok()
}

/// Registers (or finds) the selector called `name`.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn sel_register_name(name: *const c_char) -> RawSel {
    if name.is_null() {
        return std::ptr::null();
    }
    // SAFETY: caller guarantees a valid C string
    let name = unsafe { CStr::from_ptr(name) };
    match name.to_str() {
        Ok(name) => intern(name),
        Err(_) => std::ptr::null(),
    }
}

/// Returns the NUL-terminated name of `sel`. The string lives forever.
///
/// # Safety
///
/// `sel` must be null or a selector returned by this runtime.
pub unsafe extern "C" fn sel_get_name(sel: RawSel) -> *const c_char {
    if sel.is_null() {
        return std::ptr::null();
    }
    // SAFETY: selectors are leaked `SelInner`s
    unsafe { (*sel.cast::<SelInner>()).name.as_ptr() }
}

/// Selector equality is address equality.
pub extern "C" fn sel_is_equal(lhs: RawSel, rhs: RawSel) -> bool {
    std::ptr::eq(lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_interning_is_stable() {
        let a = intern("initWithFrame:");
        let b = intern("initWithFrame:");
        let c = intern("init");
        assert!(sel_is_equal(a, b));
        assert!(!sel_is_equal(a, c));
        assert_eq!(unsafe { name_of(a) }, Some("initWithFrame:"));
    }

    #[test]
    fn test_register_and_get_name() {
        let name = CString::new("count").unwrap();
        let sel = unsafe { sel_register_name(name.as_ptr()) };
        let back = unsafe { CStr::from_ptr(sel_get_name(sel)) };
        assert_eq!(back.to_str().unwrap(), "count");
        assert!(unsafe { sel_register_name(std::ptr::null()) }.is_null());
    }

    #[test]
    fn test_concurrent_interning() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| intern("sharedSelector:") as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
