//! Observable attributes
//!
//! A named value whose changes are pushed synchronously, in the calling
//! thread, to every attached listener. Components expose their observable
//! state through this type; peers attach listeners through a [`Listeners`]
//! handle, which can be cloned and held independently of the value.
//!
//! Delivery rules:
//! - listeners are called in attach order with the new value
//! - the listener list is snapshotted before delivery, so a listener attached
//!   while a notification is running only sees the next change
//! - inside [`Observable::silently`] changes are applied but nobody is told

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Identifier returned by [`Listeners::attach`], used to detach
pub type ListenerId = u64;

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Registry<T> {
    next_id: ListenerId,
    entries: Vec<(ListenerId, Callback<T>)>,
}

/// Shared handle to the listener list of an [`Observable`]
pub struct Listeners<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T> Listeners<T> {
    /// Attach a listener; it receives every subsequent change
    pub fn attach<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        registry.entries.push((id, callback));
        id
    }

    /// Detach a listener; returns false if it was not attached
    pub fn detach(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(ListenerId, Callback<T>)> {
        self.registry
            .borrow()
            .entries
            .iter()
            .map(|(id, cb)| (*id, Rc::clone(cb)))
            .collect()
    }

    fn is_attached(&self, id: ListenerId) -> bool {
        self.registry
            .borrow()
            .entries
            .iter()
            .any(|(entry_id, _)| *entry_id == id)
    }
}

/// A named value that notifies listeners when it is written
pub struct Observable<T> {
    name: &'static str,
    value: T,
    version: u64,
    silence_depth: usize,
    listeners: Listeners<T>,
}

impl<T> Observable<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            value,
            version: 0,
            silence_depth: 0,
            listeners: Listeners::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Number of writes applied so far (silent writes included)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Handle for attaching and detaching listeners
    pub fn listeners(&self) -> Listeners<T> {
        self.listeners.clone()
    }

    /// Replace the value and notify once
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.changed();
    }

    /// Mutate the value in place and notify once
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.value);
        self.changed();
        result
    }

    /// Run `f` with notifications suppressed
    ///
    /// Writes inside the block still apply and bump the version. Nesting is
    /// allowed; delivery resumes once the outermost block returns.
    pub fn silently<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.silence_depth += 1;
        let result = f(self);
        self.silence_depth -= 1;
        result
    }

    pub fn is_silent(&self) -> bool {
        self.silence_depth > 0
    }

    fn changed(&mut self) {
        self.version += 1;
        if self.is_silent() {
            debug!(observable = self.name, "change suppressed (silent)");
            return;
        }
        for (id, callback) in self.listeners.snapshot() {
            // Detached by an earlier listener during this delivery
            if !self.listeners.is_attached(id) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut cb) => (&mut *cb)(&self.value),
                Err(_) => debug!(observable = self.name, listener = id, "listener busy, skipped"),
            }
        }
    }
}

impl<T: Clone> Observable<T> {
    /// Copy of the value under the same name, with no listeners attached
    pub fn detached_copy(&self) -> Self {
        Self::new(self.name, self.value.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("version", &self.version)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
