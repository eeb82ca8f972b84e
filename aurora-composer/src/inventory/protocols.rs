//! Protocols inventory, ordered by insertion

use super::{Inventory, WriteOptions};
use crate::error::{ComposerError, ComposerResult};
use crate::models::Protocol;
use crate::schema::{get_valid, prepare};
use crate::storage::{MemoryStorage, StorageBackend};
use aurora_common::events::{AuroraEvent, EventBus, InventoryKind};
use aurora_common::observable::Observable;
use serde_json::Value;
use std::rc::Rc;
use tracing::{info, warn};

pub struct ProtocolInventory {
    storage: Rc<dyn StorageBackend>,
    records: Vec<Protocol>,
    updated: Observable<u64>,
    events: Option<EventBus>,
}

impl ProtocolInventory {
    pub fn new(storage: Rc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            records: Vec::new(),
            updated: Observable::new("updated", 0),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn init(&self) -> ComposerResult<()> {
        self.storage.init()
    }

    /// Load from the backend; invalid records and repeated names are dropped
    pub fn load(&mut self) -> usize {
        let raw = self.storage.fetch();
        let mut records: Vec<Protocol> = Vec::new();
        for protocol in get_valid::<Protocol>(&raw) {
            if records.iter().any(|p| p.name == protocol.name) {
                warn!("Dropping protocol record with duplicate name {:?}", protocol.name);
                continue;
            }
            records.push(protocol);
        }
        self.records = records;
        self.changed();
        info!("Loaded {} protocols", self.records.len());
        self.records.len()
    }

    pub fn save(&self) -> bool {
        let docs: Vec<Value> = self
            .records
            .iter()
            .filter_map(|p| match serde_json::to_value(p) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Protocol {:?} could not be encoded: {}", p.name, e);
                    None
                }
            })
            .collect();
        self.storage.save(&docs)
    }

    fn changed(&mut self) {
        self.updated.modify(|n| *n += 1);
        if let Some(events) = &self.events {
            events.emit_lossy(AuroraEvent::InventoryUpdated {
                inventory: InventoryKind::Protocols,
                revision: *self.updated.get(),
                records: self.records.len(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn finish(&mut self, opts: WriteOptions) {
        if opts.cache {
            self.changed();
        }
        if opts.save {
            self.save();
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|p| p.name == name)
    }

    pub fn add(&mut self, protocol: Protocol, opts: WriteOptions) -> ComposerResult<()> {
        let protocol = prepare(protocol)?;
        if self.contains(&protocol.name) {
            warn!("Refusing to add protocol {:?}: name already exists", protocol.name);
            return Err(ComposerError::DuplicateName(protocol.name));
        }
        info!("Adding protocol {:?} ({} steps)", protocol.name, protocol.method.len());
        self.records.push(protocol);
        self.finish(opts);
        Ok(())
    }

    /// Replace the protocol of the same name, keeping its position
    pub fn update(&mut self, protocol: Protocol, opts: WriteOptions) -> ComposerResult<()> {
        let index = self
            .position(&protocol.name)
            .ok_or_else(|| ComposerError::NotFound(format!("protocol {:?}", protocol.name)))?;
        self.records[index] = prepare(protocol)?;
        self.finish(opts);
        Ok(())
    }

    pub fn delete(&mut self, name: &str, opts: WriteOptions) -> ComposerResult<Protocol> {
        let index = self
            .position(name)
            .ok_or_else(|| ComposerError::NotFound(format!("protocol {:?}", name)))?;
        let removed = self.records.remove(index);
        self.finish(opts);
        Ok(removed)
    }

    /// Protocols by name, in the order asked; all protocols when `names` is `None`
    ///
    /// Unknown names are skipped with a warning.
    pub fn query(&self, names: Option<&[String]>) -> Vec<Protocol> {
        match names {
            None => self.records.clone(),
            Some(names) => names
                .iter()
                .filter_map(|n| {
                    let found = self.get(n).cloned();
                    if found.is_none() {
                        warn!("Protocol {:?} not in inventory", n);
                    }
                    found
                })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Protocol> {
        self.records.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|p| p.name.clone()).collect()
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn updated(&self) -> &Observable<u64> {
        &self.updated
    }
}

impl Inventory for ProtocolInventory {
    fn copy(&self) -> Self {
        let mut copy = ProtocolInventory::new(Rc::new(MemoryStorage::new()));
        copy.records = self.records.clone();
        copy
    }

    fn sync(&mut self, other: &Self) {
        self.records = other.records.clone();
        self.changed();
    }

    fn save(&self) -> bool {
        ProtocolInventory::save(self)
    }
}

impl PartialEq for ProtocolInventory {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl std::fmt::Debug for ProtocolInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolInventory")
            .field("storage", &self.storage)
            .field("names", &self.names())
            .finish()
    }
}
