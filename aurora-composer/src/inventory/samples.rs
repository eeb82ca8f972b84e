//! Samples inventory
//!
//! Records are kept by id; every read path goes through the flat table
//! cache, which is rebuilt on [`SampleInventory::cache`]. Each rebuild bumps
//! the `updated` observable. Write guards (`contains`, `has_batch`,
//! `highest_sample_id`) check the records, so they hold between deferred
//! writes.

use super::table::{Cell, Table, GROUPS_COLUMN, ID_COLUMN};
use super::{Inventory, WriteOptions};
use crate::error::{ComposerError, ComposerResult};
use crate::models::{Sample, ALL_SAMPLES};
use crate::query::{Predicate, Projection};
use crate::schema::{get_valid, prepare};
use crate::storage::{MemoryStorage, StorageBackend};
use aurora_common::events::{AuroraEvent, EventBus, InventoryKind};
use aurora_common::observable::Observable;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, info, warn};

pub struct SampleInventory {
    storage: Rc<dyn StorageBackend>,
    records: BTreeMap<u32, Sample>,
    table: Table,
    updated: Observable<u64>,
    events: Option<EventBus>,
}

impl SampleInventory {
    pub fn new(storage: Rc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            records: BTreeMap::new(),
            table: Table::default(),
            updated: Observable::new("updated", 0),
            events: None,
        }
    }

    /// Publish `InventoryUpdated` on every cache rebuild
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Create the backing document if it does not exist yet
    pub fn init(&self) -> ComposerResult<()> {
        self.storage.init()
    }

    /// Load from the backend, replacing current records
    ///
    /// Invalid records and duplicate ids are dropped with a warning. Returns
    /// the number of records kept.
    pub fn load(&mut self) -> usize {
        let raw = self.storage.fetch();
        let mut records = BTreeMap::new();
        for sample in get_valid::<Sample>(&raw) {
            if records.contains_key(&sample.id) {
                warn!("Dropping sample record with duplicate id {}", sample.id);
                continue;
            }
            records.insert(sample.id, sample);
        }
        self.records = records;
        self.cache();
        info!("Loaded {} samples", self.records.len());
        self.records.len()
    }

    /// Rebuild the table cache from the records
    pub fn cache(&mut self) {
        let docs = self.documents();
        self.table = Table::from_records(&docs);
        self.updated.modify(|n| *n += 1);
        debug!(revision = *self.updated.get(), rows = self.table.len(), "samples cache rebuilt");
        if let Some(events) = &self.events {
            events.emit_lossy(AuroraEvent::InventoryUpdated {
                inventory: InventoryKind::Samples,
                revision: *self.updated.get(),
                records: self.records.len(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn documents(&self) -> Vec<Value> {
        self.records
            .values()
            .filter_map(|s| match s.to_value() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Sample {} could not be encoded: {}", s.id, e);
                    None
                }
            })
            .collect()
    }

    /// Persist all records; false (logged) on failure
    pub fn save(&self) -> bool {
        self.storage.save(&self.documents())
    }

    fn finish(&mut self, opts: WriteOptions) {
        if opts.cache {
            self.cache();
        }
        if opts.save {
            self.save();
        }
    }

    pub fn add(&mut self, sample: Sample, opts: WriteOptions) -> ComposerResult<()> {
        self.add_many(vec![sample], opts)
    }

    /// Add several samples; refused as a whole if any is invalid or its id is taken
    pub fn add_many(&mut self, samples: Vec<Sample>, opts: WriteOptions) -> ComposerResult<()> {
        let mut prepared = Vec::with_capacity(samples.len());
        let mut seen = BTreeSet::new();
        for sample in samples {
            let sample = prepare(sample)?;
            if self.records.contains_key(&sample.id) || !seen.insert(sample.id) {
                warn!("Refusing to add sample {}: id already exists", sample.id);
                return Err(ComposerError::DuplicateId(sample.id));
            }
            prepared.push(sample);
        }
        for sample in prepared {
            self.records.insert(sample.id, sample);
        }
        self.finish(opts);
        Ok(())
    }

    /// Replace an existing sample
    pub fn update(&mut self, sample: Sample, opts: WriteOptions) -> ComposerResult<()> {
        if !self.records.contains_key(&sample.id) {
            return Err(ComposerError::NotFound(format!("sample {}", sample.id)));
        }
        let sample = prepare(sample)?;
        self.records.insert(sample.id, sample);
        self.finish(opts);
        Ok(())
    }

    pub fn delete(&mut self, id: u32, opts: WriteOptions) -> ComposerResult<Sample> {
        let removed = self
            .records
            .remove(&id)
            .ok_or_else(|| ComposerError::NotFound(format!("sample {}", id)))?;
        self.finish(opts);
        Ok(removed)
    }

    /// Delete several samples; refused as a whole if any id is missing
    pub fn delete_many(&mut self, ids: &[u32], opts: WriteOptions) -> ComposerResult<Vec<Sample>> {
        self.require_all(ids)?;
        let removed = ids.iter().filter_map(|id| self.records.remove(id)).collect();
        self.finish(opts);
        Ok(removed)
    }

    fn require_all(&self, ids: &[u32]) -> ComposerResult<()> {
        match ids.iter().find(|id| !self.records.contains_key(id)) {
            Some(missing) => Err(ComposerError::NotFound(format!("sample {}", missing))),
            None => Ok(()),
        }
    }

    pub fn get(&self, id: u32) -> Option<&Sample> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.records.contains_key(&id)
    }

    /// Samples in id order
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Table cache
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Cache revision counter
    pub fn updated(&self) -> &Observable<u64> {
        &self.updated
    }

    pub fn query(&self, predicate: &Predicate, projection: Option<&Projection>) -> Table {
        let query = predicate.compile();
        debug!(query = %query, "samples query");
        query.evaluate(&self.table, projection)
    }

    /// Every group label used by some sample
    pub fn get_group_labels(&self) -> BTreeSet<String> {
        self.table
            .column(GROUPS_COLUMN)
            .filter_map(Cell::as_set)
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    /// Ids of the samples in group `label`, ascending
    pub fn get_group_samples(&self, label: &str) -> Vec<u32> {
        self.table
            .rows()
            .iter()
            .filter(|row| row.get(GROUPS_COLUMN).as_set().map_or(false, |g| g.contains(label)))
            .filter_map(|row| match row.get(ID_COLUMN) {
                Cell::Int(id) => u32::try_from(*id).ok(),
                _ => None,
            })
            .collect()
    }

    /// Make `ids` exactly the members of group `label`
    ///
    /// The label is removed from every sample, then added to `ids`. A group
    /// left empty disappears. The ambient group is never removed from anyone.
    pub fn save_group(&mut self, ids: &[u32], label: &str, opts: WriteOptions) -> ComposerResult<()> {
        self.require_all(ids)?;
        if label != ALL_SAMPLES {
            for sample in self.records.values_mut() {
                sample.metadata.groups.remove(label);
            }
        }
        for id in ids {
            if let Some(sample) = self.records.get_mut(id) {
                sample.metadata.groups.insert(label.to_string());
            }
        }
        info!("Group {:?} now has {} samples", label, ids.len());
        self.finish(opts);
        Ok(())
    }

    pub fn assign_subbatch(&mut self, ids: &[u32], label: &str, opts: WriteOptions) -> ComposerResult<()> {
        self.require_all(ids)?;
        for id in ids {
            if let Some(sample) = self.records.get_mut(id) {
                sample.metadata.subbatch = label.to_string();
            }
        }
        self.finish(opts);
        Ok(())
    }

    pub fn has_batch(&self, batch: &str) -> bool {
        self.records.values().any(|s| s.metadata.batch == batch)
    }

    /// Highest id in use, 0 when empty
    pub fn highest_sample_id(&self) -> u32 {
        self.records.keys().next_back().copied().unwrap_or(0)
    }
}

impl Inventory for SampleInventory {
    fn copy(&self) -> Self {
        let mut copy = SampleInventory::new(Rc::new(MemoryStorage::new()));
        copy.records = self.records.clone();
        copy.cache();
        copy
    }

    fn sync(&mut self, other: &Self) {
        self.records = other.records.clone();
        self.cache();
    }

    fn save(&self) -> bool {
        SampleInventory::save(self)
    }
}

impl PartialEq for SampleInventory {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl std::fmt::Debug for SampleInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleInventory")
            .field("storage", &self.storage)
            .field("records", &self.records.len())
            .field("revision", self.updated.get())
            .finish()
    }
}
