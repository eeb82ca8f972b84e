//! Technique catalogue
//!
//! The closed set of steps a protocol may contain, with the device each one
//! runs on and its parameter template.

use super::protocol::{Parameter, Scalar, ScalarType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Device running the electrochemical steps
pub const CYCLER_DEVICE: &str = "MPG2";
/// Loop steps are handled by the job worker, not the instrument
pub const WORKER_DEVICE: &str = "worker";

const I_RANGES: &[&str] = &[
    "keep", "100 pA", "1 nA", "10 nA", "100 nA", "1 uA", "10 uA", "100 uA", "1 mA", "10 mA",
    "100 mA", "1 A",
];
const E_RANGES: &[&str] = &["+-2.5 V", "+-5.0 V", "+-10 V", "auto"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueKind {
    OpenCircuitVoltage,
    ConstantCurrent,
    ConstantVoltage,
    SweepCurrent,
    SweepVoltage,
    Loop,
}

impl TechniqueKind {
    pub const ALL: [TechniqueKind; 6] = [
        TechniqueKind::OpenCircuitVoltage,
        TechniqueKind::ConstantCurrent,
        TechniqueKind::ConstantVoltage,
        TechniqueKind::SweepCurrent,
        TechniqueKind::SweepVoltage,
        TechniqueKind::Loop,
    ];

    /// Document tag
    pub fn tag(&self) -> &'static str {
        match self {
            TechniqueKind::OpenCircuitVoltage => "open_circuit_voltage",
            TechniqueKind::ConstantCurrent => "constant_current",
            TechniqueKind::ConstantVoltage => "constant_voltage",
            TechniqueKind::SweepCurrent => "sweep_current",
            TechniqueKind::SweepVoltage => "sweep_voltage",
            TechniqueKind::Loop => "loop",
        }
    }

    /// Short name used in generated step names
    pub fn short_name(&self) -> &'static str {
        match self {
            TechniqueKind::OpenCircuitVoltage => "OCV",
            TechniqueKind::ConstantCurrent => "CC",
            TechniqueKind::ConstantVoltage => "CV",
            TechniqueKind::SweepCurrent => "SWEEP_I",
            TechniqueKind::SweepVoltage => "SWEEP_V",
            TechniqueKind::Loop => "LOOP",
        }
    }

    pub fn device(&self) -> &'static str {
        match self {
            TechniqueKind::Loop => WORKER_DEVICE,
            _ => CYCLER_DEVICE,
        }
    }

    /// Fresh parameter map for this kind, values set to their defaults
    pub fn template(&self) -> BTreeMap<String, Parameter> {
        let mut p = Template::default();
        match self {
            TechniqueKind::OpenCircuitVoltage => {
                p.float("time", "Time", "Duration of the rest", "s", None, true);
                p.record_dt();
                p.float("record_every_dE", "Record every dE", "Record when the voltage changes by", "V", Some(0.005), false);
                p.literal("E_range", "E range", "Voltage range", E_RANGES, "auto");
            }
            TechniqueKind::ConstantCurrent => {
                p.float("current", "Current", "Applied current", "A", None, true);
                p.float("time", "Time", "Maximum duration of the step", "s", None, true);
                p.float("limit_voltage_min", "Minimum voltage", "Stop below this voltage", "V", None, false);
                p.float("limit_voltage_max", "Maximum voltage", "Stop above this voltage", "V", None, false);
                p.record_dt();
                p.float("record_every_dE", "Record every dE", "Record when the voltage changes by", "V", Some(0.005), false);
                p.ranges();
            }
            TechniqueKind::ConstantVoltage => {
                p.float("voltage", "Voltage", "Applied voltage", "V", None, true);
                p.float("time", "Time", "Maximum duration of the step", "s", None, true);
                p.float("limit_current_min", "Minimum current", "Stop below this current", "A", None, false);
                p.float("limit_current_max", "Maximum current", "Stop above this current", "A", None, false);
                p.record_dt();
                p.float("record_every_dI", "Record every dI", "Record when the current changes by", "A", Some(0.001), false);
                p.ranges();
            }
            TechniqueKind::SweepCurrent => {
                p.float("current_start", "Start current", "Current at the start of the sweep", "A", None, true);
                p.float("current_end", "End current", "Current at the end of the sweep", "A", None, true);
                p.float("time", "Time", "Duration of the sweep", "s", None, true);
                p.float("limit_voltage_min", "Minimum voltage", "Stop below this voltage", "V", None, false);
                p.float("limit_voltage_max", "Maximum voltage", "Stop above this voltage", "V", None, false);
                p.record_dt();
                p.float("record_every_dE", "Record every dE", "Record when the voltage changes by", "V", Some(0.005), false);
                p.ranges();
            }
            TechniqueKind::SweepVoltage => {
                p.float("voltage_start", "Start voltage", "Voltage at the start of the sweep", "V", None, true);
                p.float("voltage_end", "End voltage", "Voltage at the end of the sweep", "V", None, true);
                p.float("time", "Time", "Duration of the sweep", "s", None, true);
                p.float("limit_current_min", "Minimum current", "Stop below this current", "A", None, false);
                p.float("limit_current_max", "Maximum current", "Stop above this current", "A", None, false);
                p.record_dt();
                p.float("record_every_dI", "Record every dI", "Record when the current changes by", "A", Some(0.001), false);
                p.ranges();
            }
            TechniqueKind::Loop => {
                p.int("goto", "Go to", "Index of the step to jump back to (1-based)", "", 1, true);
                // -1 is passed through to the engine unchanged and means unlimited
                p.int("n_gotos", "Repeats", "Number of jumps back, -1 for unlimited", "", -1, true);
            }
        }
        p.0
    }
}

impl fmt::Display for TechniqueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for TechniqueKind {
    type Err = String;

    /// Accepts either the document tag or the short name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TechniqueKind::ALL
            .iter()
            .copied()
            .find(|k| k.tag().eq_ignore_ascii_case(wanted) || k.short_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown technique {:?}", s))
    }
}

#[derive(Default)]
struct Template(BTreeMap<String, Parameter>);

impl Template {
    fn insert(&mut self, key: &str, param: Parameter) {
        self.0.insert(key.to_string(), param);
    }

    fn float(&mut self, key: &str, label: &str, description: &str, units: &str, default: Option<f64>, required: bool) {
        let default_value = default.map(Scalar::Float);
        self.insert(
            key,
            Parameter {
                label: label.to_string(),
                description: description.to_string(),
                units: units.to_string(),
                value: default_value.clone(),
                default_value,
                required,
                kind: ScalarType::Float,
                options: Vec::new(),
            },
        );
    }

    fn int(&mut self, key: &str, label: &str, description: &str, units: &str, default: i64, required: bool) {
        self.insert(
            key,
            Parameter {
                label: label.to_string(),
                description: description.to_string(),
                units: units.to_string(),
                value: Some(Scalar::Int(default)),
                default_value: Some(Scalar::Int(default)),
                required,
                kind: ScalarType::Int,
                options: Vec::new(),
            },
        );
    }

    fn literal(&mut self, key: &str, label: &str, description: &str, options: &[&str], default: &str) {
        let default_value = Some(Scalar::Str(default.to_string()));
        self.insert(
            key,
            Parameter {
                label: label.to_string(),
                description: description.to_string(),
                units: String::new(),
                value: default_value.clone(),
                default_value,
                required: true,
                kind: ScalarType::Literal,
                options: options.iter().map(|o| o.to_string()).collect(),
            },
        );
    }

    fn record_dt(&mut self) {
        self.float("record_every_dt", "Record every dt", "Sampling interval", "s", Some(30.0), true);
    }

    fn ranges(&mut self) {
        self.literal("I_range", "I range", "Current range", I_RANGES, "10 mA");
        self.literal("E_range", "E range", "Voltage range", E_RANGES, "auto");
    }
}
