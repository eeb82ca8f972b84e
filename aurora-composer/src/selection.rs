//! Composer selection
//!
//! Three coupled observables: the chosen sample ids, the ordered protocol
//! names, and settings per protocol. Every mutation writes the affected
//! observable once. `valid_input` is kept equal to the gate verdict after
//! each mutation and written only when it flips.
//!
//! The selection holds keys only; records are resolved from the inventories
//! on demand.

use crate::error::{ComposerError, ComposerResult};
use crate::gate::{self, Verdict};
use crate::inventory::{ProtocolInventory, SampleInventory};
use crate::models::{Monitor, Protocol, Sample, Settings};
use aurora_common::observable::Observable;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub struct Selection {
    samples: Observable<BTreeSet<u32>>,
    protocols: Observable<Vec<String>>,
    settings: Observable<BTreeMap<String, Settings>>,
    generate_preview: Observable<u64>,
    valid_input: Observable<bool>,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

impl Selection {
    pub fn new() -> Self {
        Self {
            samples: Observable::new("samples", BTreeSet::new()),
            protocols: Observable::new("protocols", Vec::new()),
            settings: Observable::new("settings", BTreeMap::new()),
            generate_preview: Observable::new("generate_preview", 0),
            valid_input: Observable::new("valid_input", false),
        }
    }

    pub fn samples(&self) -> &Observable<BTreeSet<u32>> {
        &self.samples
    }

    pub fn protocols(&self) -> &Observable<Vec<String>> {
        &self.protocols
    }

    pub fn settings(&self) -> &Observable<BTreeMap<String, Settings>> {
        &self.settings
    }

    pub fn generate_preview(&self) -> &Observable<u64> {
        &self.generate_preview
    }

    pub fn valid_input(&self) -> &Observable<bool> {
        &self.valid_input
    }

    pub fn verdict(&self) -> Verdict {
        gate::check(self.samples.get(), self.protocols.get(), self.settings.get())
    }

    fn refresh_valid(&mut self) {
        let valid = self.verdict().is_valid();
        if *self.valid_input.get() != valid {
            self.valid_input.set(valid);
        }
    }

    pub fn select_samples(&mut self, ids: &[u32]) {
        self.samples.modify(|set| set.extend(ids.iter().copied()));
        self.refresh_valid();
    }

    pub fn deselect_samples(&mut self, ids: &[u32]) {
        self.samples.modify(|set| {
            for id in ids {
                set.remove(id);
            }
        });
        self.refresh_valid();
    }

    /// Append protocols to the execution order, skipping ones already selected
    pub fn select_protocols(&mut self, names: &[String]) {
        self.protocols.modify(|order| {
            for name in names {
                if !order.contains(name) {
                    order.push(name.clone());
                }
            }
        });
        self.refresh_valid();
    }

    /// Remove protocols and their settings
    pub fn deselect_protocols(&mut self, names: &[String]) {
        self.protocols.modify(|order| order.retain(|n| !names.contains(n)));
        if names.iter().any(|n| self.settings.get().contains_key(n)) {
            self.settings.modify(|map| {
                for name in names {
                    map.remove(name);
                }
            });
        }
        self.refresh_valid();
    }

    /// Attach settings to a selected protocol, replacing earlier ones
    pub fn save_settings(&mut self, protocol: &str, settings: Settings) -> ComposerResult<()> {
        if !self.protocols.get().iter().any(|p| p == protocol) {
            return Err(ComposerError::NotFound(format!(
                "protocol {:?} is not selected",
                protocol
            )));
        }
        let settings = settings.with_defaults();
        settings.validate()?;
        self.settings
            .modify(|map| map.insert(protocol.to_string(), settings));
        self.refresh_valid();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.samples.set(BTreeSet::new());
        self.protocols.set(Vec::new());
        self.settings.set(BTreeMap::new());
        self.refresh_valid();
    }

    /// Run the gate, bump `generate_preview` and store the verdict in `valid_input`
    pub fn signal_preview(&mut self) -> Verdict {
        let verdict = self.verdict();
        debug!(valid = verdict.is_valid(), reason = ?verdict.reason(), "preview requested");
        self.generate_preview.modify(|n| *n += 1);
        self.valid_input.set(verdict.is_valid());
        verdict
    }

    /// Selected samples in id order; ids no longer in the inventory are skipped
    pub fn get_samples(&self, inventory: &SampleInventory) -> Vec<Sample> {
        self.samples
            .get()
            .iter()
            .filter_map(|id| {
                let found = inventory.get(*id).cloned();
                if found.is_none() {
                    warn!("Selected sample {} is not in the inventory", id);
                }
                found
            })
            .collect()
    }

    /// Selected protocols in execution order
    pub fn get_protocols(&self, inventory: &ProtocolInventory) -> Vec<Protocol> {
        inventory.query(Some(self.protocols.get().as_slice()))
    }

    pub fn get_settings(&self, protocol: &str) -> Option<&Settings> {
        self.settings.get().get(protocol)
    }

    pub fn get_monitors(&self, protocol: &str) -> BTreeMap<String, Monitor> {
        self.get_settings(protocol)
            .map(|s| s.monitors.clone())
            .unwrap_or_default()
    }
}
