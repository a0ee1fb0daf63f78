//! Weak observer lists
//!
//! A buffer that reallocates or rewrites a slot tells the resources built on
//! top of it to refresh. Observers are held weakly so a buffer never keeps its
//! bindings alive.

use std::sync::{Mutex, Weak};

use crate::foundation::sync::lock;

/// A resource that must refresh when something it references changes
pub trait Dependent: Send + Sync {
    /// Schedule a rewrite of every slot on the coming ticks
    fn invalidate(&self);
}

/// Weak list of dependents
#[derive(Default)]
pub struct Dependents {
    entries: Mutex<Vec<Weak<dyn Dependent>>>,
}

impl Dependents {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependent; registering the same one twice has no effect
    pub fn register(&self, dependent: Weak<dyn Dependent>) {
        let mut entries = lock(&self.entries);
        let target = dependent.as_ptr().cast::<()>();
        if !entries.iter().any(|e| e.as_ptr().cast::<()>() == target) {
            entries.push(dependent);
        }
    }

    /// Invalidate every live dependent and drop the dead ones
    ///
    /// Dependents are collected first and notified with the list unlocked,
    /// since a dependent may register itself again while refreshing.
    pub fn notify(&self) {
        let live: Vec<_> = {
            let mut entries = lock(&self.entries);
            entries.retain(|e| e.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };
        for dependent in live {
            dependent.invalidate();
        }
    }

    /// Number of registered dependents still alive
    pub fn live_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.strong_count() > 0)
            .count()
    }

    /// Number of entries currently stored, dead ones included
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
