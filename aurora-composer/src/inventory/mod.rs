//! Inventories of samples and protocols
//!
//! Inventories exclusively own their records. Mutations take
//! [`WriteOptions`] deciding whether the table cache is rebuilt and whether
//! the document is written afterwards.
//!
//! Editing is transactional through [`WorkingCopy`]: a detached copy is
//! mutated freely, compared against the master to drive a dirty flag, and
//! reconciled only by an explicit commit.

pub mod protocols;
pub mod samples;
pub mod table;

pub use protocols::ProtocolInventory;
pub use samples::SampleInventory;
pub use table::{Cell, Row, Table};

use aurora_common::observable::Observable;
use tracing::info;

/// Post-mutation behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Rebuild the table cache
    pub cache: bool,
    /// Persist the document
    pub save: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            cache: true,
            save: true,
        }
    }
}

impl WriteOptions {
    /// Rebuild the cache but do not persist
    pub fn unsaved() -> Self {
        Self {
            cache: true,
            save: false,
        }
    }

    /// Neither rebuild nor persist; used for batched edits
    pub fn deferred() -> Self {
        Self {
            cache: false,
            save: false,
        }
    }
}

/// Operations shared by both inventories
pub trait Inventory: PartialEq {
    /// Detached copy holding the same records; its saves do not reach the master document
    fn copy(&self) -> Self;

    /// Replace this inventory's records with `other`'s and rebuild the cache
    fn sync(&mut self, other: &Self);

    /// Persist the current records; false (logged) on failure
    fn save(&self) -> bool;
}

/// Editable copy of an inventory bound to its master
pub struct WorkingCopy<I: Inventory> {
    working: I,
    dirty: Observable<bool>,
}

impl<I: Inventory> WorkingCopy<I> {
    pub fn new(master: &I) -> Self {
        Self {
            working: master.copy(),
            dirty: Observable::new("dirty", false),
        }
    }

    pub fn working(&self) -> &I {
        &self.working
    }

    /// True when the working copy differs from the master
    pub fn dirty(&self) -> &Observable<bool> {
        &self.dirty
    }

    /// Apply `f` to the working copy and refresh the dirty flag
    pub fn edit<R>(&mut self, master: &I, f: impl FnOnce(&mut I) -> R) -> R {
        let result = f(&mut self.working);
        self.refresh_dirty(master);
        result
    }

    pub fn refresh_dirty(&mut self, master: &I) {
        let dirty = self.working != *master;
        if *self.dirty.get() != dirty {
            self.dirty.set(dirty);
        }
    }

    /// Reconcile the master with the working copy and persist it
    pub fn commit(&mut self, master: &mut I) -> bool {
        master.sync(&self.working);
        let saved = master.save();
        info!(saved, "working copy committed");
        self.refresh_dirty(master);
        saved
    }

    /// Drop uncommitted edits
    pub fn reset(&mut self, master: &I) {
        self.working.sync(master);
        self.refresh_dirty(master);
    }
}
