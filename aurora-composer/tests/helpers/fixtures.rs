//! Sample, protocol and settings fixtures

use aurora_composer::models::{
    Capacity, Composition, ControlSettings, Electrode, ElectrodeCapacity, Electrolyte, Monitor,
    Protocol, Sample, SampleMetadata, SampleSpecs, Scalar, Separator, Settings, Technique,
    TechniqueKind, Verbosity, Weight, ALL_SAMPLES,
};
use aurora_composer::storage::{JsonStorage, MemoryStorage};
use aurora_composer::{ProtocolInventory, SampleInventory};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

pub const BATCH: &str = "230101";

fn electrode(formula: &str, position: u32, net: f64, nominal: f64) -> Electrode {
    Electrode {
        formula: formula.to_string(),
        position,
        diameter: 15.0,
        weight: Weight::from_total(net + 8.0, 8.0),
        capacity: ElectrodeCapacity {
            nominal,
            units: "mAh".to_string(),
        },
    }
}

/// Valid sample `id` of batch 230101, in the ambient group only
pub fn sample(id: u32) -> Sample {
    sample_in_groups(id, &[])
}

/// Valid sample with extra group labels
pub fn sample_in_groups(id: u32, groups: &[&str]) -> Sample {
    let mut labels: BTreeSet<String> = groups.iter().map(|g| g.to_string()).collect();
    labels.insert(ALL_SAMPLES.to_string());

    let created = NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(9, id % 24, 0))
        .unwrap();

    Sample {
        id,
        metadata: SampleMetadata {
            name: format!("{}-{}", BATCH, id),
            batch: BATCH.to_string(),
            subbatch: "0".to_string(),
            creation_datetime: created,
            creation_process: "manual".to_string(),
            groups: labels,
        },
        specs: SampleSpecs {
            manufacturer: "Empa".to_string(),
            case: "CR2032".to_string(),
            capacity: Capacity {
                nominal: 1.44,
                units: "mAh".to_string(),
            },
            composition: Composition {
                anode: electrode("Graphite", 1, 12.0, 4.2),
                cathode: electrode("NMC811", 2, 8.0, 1.44),
                electrolyte: Electrolyte {
                    formula: "LP30".to_string(),
                    position: 3,
                    amount: 40.0,
                },
                separator: Separator {
                    name: "Whatman GF/D".to_string(),
                    diameter: 16.0,
                },
                spacer: 1.0,
            },
        },
        extra: BTreeMap::new(),
    }
}

fn step(kind: TechniqueKind, name: &str, values: &[(&str, f64)]) -> Technique {
    let mut technique = Technique::new(kind, name);
    for (key, value) in values {
        technique.set_parameter(key, Scalar::Float(*value)).unwrap();
    }
    technique
}

/// Submittable two-step protocol: a rest followed by a constant-current charge
pub fn protocol(name: &str) -> Protocol {
    Protocol::new(
        name,
        vec![
            step(TechniqueKind::OpenCircuitVoltage, "OCV_1", &[("time", 3600.0)]),
            step(
                TechniqueKind::ConstantCurrent,
                "CC_1",
                &[("current", 0.001), ("time", 7200.0)],
            ),
        ],
    )
}

/// Control settings at INFO, no monitors
pub fn settings() -> Settings {
    Settings::new(
        ControlSettings {
            verbosity: Verbosity::Info,
            snapshot: None,
            unlock_when_done: false,
        },
        BTreeMap::new(),
    )
}

/// Settings with one default capacity monitor named `name`
pub fn settings_with_monitor(name: &str) -> Settings {
    let mut monitors = BTreeMap::new();
    monitors.insert(name.to_string(), Monitor::default());
    Settings::new(ControlSettings::default(), monitors)
}

pub fn memory_samples(samples: Vec<Sample>) -> SampleInventory {
    let mut inventory = SampleInventory::new(Rc::new(MemoryStorage::new()));
    inventory
        .add_many(samples, aurora_composer::WriteOptions::default())
        .unwrap();
    inventory
}

pub fn memory_protocols(protocols: Vec<Protocol>) -> ProtocolInventory {
    let mut inventory = ProtocolInventory::new(Rc::new(MemoryStorage::new()));
    for p in protocols {
        inventory
            .add(p, aurora_composer::WriteOptions::default())
            .unwrap();
    }
    inventory
}

/// JSON-backed inventories in a temporary data folder
pub struct JsonInventories {
    pub dir: TempDir,
    pub samples_path: PathBuf,
    pub protocols_path: PathBuf,
}

impl JsonInventories {
    pub fn open_samples(&self) -> SampleInventory {
        let mut inventory = SampleInventory::new(Rc::new(JsonStorage::new(&self.samples_path)));
        inventory.init().unwrap();
        inventory.load();
        inventory
    }

    pub fn open_protocols(&self) -> ProtocolInventory {
        let mut inventory =
            ProtocolInventory::new(Rc::new(JsonStorage::new(&self.protocols_path)));
        inventory.init().unwrap();
        inventory.load();
        inventory
    }
}

pub fn json_inventories() -> JsonInventories {
    let dir = TempDir::new().unwrap();
    let samples_path = dir.path().join("available_samples.json");
    let protocols_path = dir.path().join("available_protocols.json");
    JsonInventories {
        dir,
        samples_path,
        protocols_path,
    }
}

const ROBOT_HEADER: &str = "Battery_Number;Casing Type;Anode Type;Anode Weight;Anode Diameter;\
Anode Current Collector Weight (mg);Anode Practical Capacity (mAh/g);Anode Position;Cathode Type;\
Cathode Weight (mg);Cathode Diameter (mm);Cathode Current Collector Weight (mg);\
Cathode Practical Capacity (mAh/g);Cathode Position;Electrolyte;Electrolyte Position;\
Electrolyte Amount;Separator;Separator Diameter (mm);Spacer (mm)";

/// Robot export with one row per battery number
pub fn robot_csv(numbers: &[u32]) -> String {
    let mut text = String::from(ROBOT_HEADER);
    for n in numbers {
        text.push('\n');
        text.push_str(&format!(
            "{};CR2032;Graphite;20,0;15;8,0;350;1;NMC811;18.0;14;10.0;180;2;LP30;3;40;GF/D;16;1.0",
            n
        ));
    }
    text.push('\n');
    text
}
