//! Weak address-to-wrapper table.
//!
//! Each fuse group owns one cache. Entries are weak, so a cached wrapper is
//! dropped as soon as the host lets go of it; the wrapper's destructor then
//! removes its own entry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::storage::Addr;

pub(crate) struct IdentityCache<T> {
    entries: RefCell<HashMap<Addr, Weak<T>>>,
}

impl<T> IdentityCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Live wrapper for `addr`, if the host still holds one.
    pub(crate) fn lookup(&self, addr: Addr) -> Option<Rc<T>> {
        let hit = self.entries.borrow().get(&addr).and_then(Weak::upgrade);
        match &hit {
            Some(_) => tracing::trace!("[IDENT] Hit for {}", addr),
            None => tracing::trace!("[IDENT] Miss for {}", addr),
        }
        hit
    }

    pub(crate) fn register(&self, addr: Addr, wrapper: &Rc<T>) {
        self.entries.borrow_mut().insert(addr, Rc::downgrade(wrapper));
    }

    /// Drop the entry for `addr` if its wrapper is gone.
    ///
    /// Called from wrapper destructors, so it must not panic on a busy table.
    pub(crate) fn unregister(&self, addr: Addr) {
        let Ok(mut entries) = self.entries.try_borrow_mut() else {
            tracing::trace!("[IDENT] Table busy, left stale entry for {}", addr);
            return;
        };
        if entries
            .get(&addr)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            entries.remove(&addr);
            tracing::trace!("[IDENT] Unregistered {}", addr);
        }
    }

    /// Move every live entry of `other` into this cache.
    pub(crate) fn absorb(&self, other: &IdentityCache<T>) {
        let moved = std::mem::take(&mut *other.entries.borrow_mut());
        self.entries.borrow_mut().extend(
            moved
                .into_iter()
                .filter(|(_, weak)| weak.strong_count() > 0),
        );
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Teardown hook: forget every entry.
    pub(crate) fn clear(&self) {
        if let Ok(mut entries) = self.entries.try_borrow_mut() {
            entries.clear();
        }
    }
}
