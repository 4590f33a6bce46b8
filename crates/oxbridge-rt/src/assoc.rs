//! Associated storage: a side table of `(object, key) -> value` words.
//!
//! Values are stored as raw words; the runtime never retains or releases
//! them. Entries for an object are dropped when the object is disposed.

use crate::abi::RawId;
use fxhash::FxHashMap;
use std::ffi::c_void;
use std::sync::{Mutex, OnceLock};

type Table = FxHashMap<usize, FxHashMap<usize, usize>>;

static ASSOCIATIONS: OnceLock<Mutex<Table>> = OnceLock::new();

fn table() -> &'static Mutex<Table> {
    ASSOCIATIONS.get_or_init(|| Mutex::new(FxHashMap::default()))
}

pub(crate) fn remove_all(obj: RawId) {
    if let Ok(mut table) = table().lock() {
        table.remove(&(obj as usize));
    }
}

/// Associates `value` with `obj` under `key`. A null `value` removes the entry.
///
/// The policy argument is ignored: every value is stored as an unretained
/// word, whatever retain or copy semantics a caller asks for, and setting a
/// key again overwrites its value.
pub extern "C" fn objc_set_associated_object(
    obj: RawId,
    key: *const c_void,
    value: RawId,
    _policy: usize,
) {
    if obj.is_null() {
        return;
    }
    let Ok(mut table) = table().lock() else {
        return;
    };
    if value.is_null() {
        if let Some(entries) = table.get_mut(&(obj as usize)) {
            entries.remove(&(key as usize));
            if entries.is_empty() {
                table.remove(&(obj as usize));
            }
        }
    } else {
        table
            .entry(obj as usize)
            .or_default()
            .insert(key as usize, value as usize);
    }
}

/// Returns the value associated with `obj` under `key`, or null.
pub extern "C" fn objc_get_associated_object(obj: RawId, key: *const c_void) -> RawId {
    let Ok(table) = table().lock() else {
        return std::ptr::null_mut();
    };
    table
        .get(&(obj as usize))
        .and_then(|entries| entries.get(&(key as usize)))
        .map_or(std::ptr::null_mut(), |&value| value as RawId)
}

/// Removes every association of `obj`.
pub extern "C" fn objc_remove_associated_objects(obj: RawId) {
    remove_all(obj);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let obj = Box::into_raw(Box::new(0u64)).cast::<c_void>();
        let key_a = 1usize as *const c_void;
        let key_b = 2usize as *const c_void;

        objc_set_associated_object(obj, key_a, 0xA0 as RawId, 0);
        objc_set_associated_object(obj, key_b, 0xB0 as RawId, 0);
        assert_eq!(objc_get_associated_object(obj, key_a) as usize, 0xA0);
        assert_eq!(objc_get_associated_object(obj, key_b) as usize, 0xB0);

        objc_set_associated_object(obj, key_a, std::ptr::null_mut(), 0);
        assert!(objc_get_associated_object(obj, key_a).is_null());

        objc_remove_associated_objects(obj);
        assert!(objc_get_associated_object(obj, key_b).is_null());

        drop(unsafe { Box::from_raw(obj.cast::<u64>()) });
    }

    #[test]
    fn test_policy_does_not_change_storage() {
        let obj = Box::into_raw(Box::new(0u64)).cast::<c_void>();
        let key = 3usize as *const c_void;

        // OBJC_ASSOCIATION_RETAIN_NONATOMIC, then OBJC_ASSOCIATION_COPY
        objc_set_associated_object(obj, key, 0xC0 as RawId, 1);
        assert_eq!(objc_get_associated_object(obj, key) as usize, 0xC0);
        objc_set_associated_object(obj, key, 0xC1 as RawId, 0o1403);
        assert_eq!(objc_get_associated_object(obj, key) as usize, 0xC1);

        objc_remove_associated_objects(obj);
        drop(unsafe { Box::from_raw(obj.cast::<u64>()) });
    }
}
