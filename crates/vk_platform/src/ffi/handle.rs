//! Process-wide handle registry
//!
//! Every object handed to the host is an `Arc` stored here under a slotmap key.
//! The host's handle is one strong reference; the object lives on while
//! anything inside the platform still references it.

use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock};

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::foundation::sync::lock;

new_key_type! {
    struct HandleKey;
}

/// Opaque handle given to the host; 0 is null
#[allow(non_camel_case_types)]
pub type vkp_handle = u64;

/// The null handle
pub const NULL_HANDLE: vkp_handle = 0;

type Entry = Arc<dyn Any + Send + Sync>;

fn registry() -> &'static Mutex<SlotMap<HandleKey, Entry>> {
    static REGISTRY: OnceLock<Mutex<SlotMap<HandleKey, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(SlotMap::with_key()))
}

fn key(handle: vkp_handle) -> Option<HandleKey> {
    (handle != NULL_HANDLE).then(|| HandleKey::from(KeyData::from_ffi(handle)))
}

/// Register `value` and return its handle
pub fn insert<T: Any + Send + Sync>(value: Arc<T>) -> vkp_handle {
    let key = lock(registry()).insert(value);
    key.data().as_ffi()
}

/// Registered object of type `T`, or `None` for null, stale or mistyped handles
pub fn get<T: Any + Send + Sync>(handle: vkp_handle) -> Option<Arc<T>> {
    let key = key(handle)?;
    let entry = lock(registry()).get(key)?.clone();
    entry.downcast::<T>().ok()
}

/// Whether `handle` refers to a live entry of type `T`
pub fn is<T: Any + Send + Sync>(handle: vkp_handle) -> bool {
    key(handle)
        .and_then(|key| lock(registry()).get(key).map(|entry| entry.is::<T>()))
        .unwrap_or(false)
}

/// Drop the registry's reference; false when the handle was not live
pub fn remove(handle: vkp_handle) -> bool {
    // Drop the value after releasing the lock; destructors may re-enter the registry
    let removed = key(handle).and_then(|key| lock(registry()).remove(key));
    removed.is_some()
}

/// Number of live handles
pub fn live_handles() -> usize {
    lock(registry()).len()
}
