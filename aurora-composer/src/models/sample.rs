//! Battery sample records
//!
//! A sample is keyed by an integer `id`. Older documents call the key
//! `battery_id`; it is read under either name and always written as `id`.
//! Fields outside the known structure are kept in `extra` so they survive a
//! load/save cycle.

use crate::storage::encoding::{tagged_datetime, tagged_set};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Group every sample belongs to
pub const ALL_SAMPLES: &str = "all-samples";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(alias = "battery_id")]
    pub id: u32,
    pub metadata: SampleMetadata,
    pub specs: SampleSpecs,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub name: String,
    pub batch: String,
    #[serde(default = "default_subbatch")]
    pub subbatch: String,
    #[serde(with = "tagged_datetime")]
    pub creation_datetime: NaiveDateTime,
    #[serde(default)]
    pub creation_process: String,
    #[serde(default, with = "tagged_set")]
    pub groups: BTreeSet<String>,
}

fn default_subbatch() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpecs {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub case: String,
    pub capacity: Capacity,
    pub composition: Composition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub nominal: f64,
    #[serde(default = "default_capacity_units")]
    pub units: String,
}

fn default_capacity_units() -> String {
    "mAh".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub anode: Electrode,
    pub cathode: Electrode,
    #[serde(default)]
    pub electrolyte: Electrolyte,
    #[serde(default)]
    pub separator: Separator,
    /// Spacer thickness (mm)
    #[serde(default)]
    pub spacer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Electrode {
    pub formula: String,
    #[serde(default)]
    pub position: u32,
    /// Diameter (mm)
    #[serde(default)]
    pub diameter: f64,
    pub weight: Weight,
    pub capacity: ElectrodeCapacity,
}

/// Electrode weights; `net = total - collector`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub total: f64,
    #[serde(default)]
    pub collector: f64,
    pub net: f64,
    #[serde(default = "default_weight_units")]
    pub units: String,
}

fn default_weight_units() -> String {
    "mg".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeCapacity {
    pub nominal: f64,
    #[serde(default = "default_capacity_units")]
    pub units: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Electrolyte {
    #[serde(default)]
    pub formula: String,
    #[serde(default)]
    pub position: u32,
    /// Dispensed amount (µL)
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Separator {
    #[serde(default)]
    pub name: String,
    /// Diameter (mm)
    #[serde(default)]
    pub diameter: f64,
}

impl Sample {
    /// Display label used for workflow naming
    pub fn label(&self) -> &str {
        &self.metadata.name
    }

    pub fn in_group(&self, label: &str) -> bool {
        self.metadata.groups.contains(label)
    }

    /// Serialize to the document form
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl Weight {
    /// Build from total and collector weights (mg)
    pub fn from_total(total: f64, collector: f64) -> Self {
        Self {
            total,
            collector,
            net: total - collector,
            units: default_weight_units(),
        }
    }
}

impl Electrode {
    /// Electrode capacity (mAh) from its net weight (mg) and practical capacity (mAh/g)
    pub fn capacity_from_practical(net_mg: f64, practical_mah_per_g: f64) -> ElectrodeCapacity {
        ElectrodeCapacity {
            nominal: net_mg * practical_mah_per_g / 1000.0,
            units: default_capacity_units(),
        }
    }
}

impl Capacity {
    /// Cell capacity is limited by the weaker electrode, rounded to 3 decimals
    pub fn limiting(anode: &ElectrodeCapacity, cathode: &ElectrodeCapacity) -> Self {
        let nominal = anode.nominal.min(cathode.nominal);
        Self {
            nominal: (nominal * 1000.0).round() / 1000.0,
            units: default_capacity_units(),
        }
    }
}
