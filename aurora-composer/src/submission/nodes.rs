//! Typed input nodes handed to the workflow engine
//!
//! Bundles are immutable values built before dispatch; nothing in them
//! refers back to the inventories.

use crate::models::{
    CheckType, ControlSettings, Monitor, Protocol, Sample, Snapshot, Technique, Verbosity,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Monitor implementation run by the engine
pub const MONITOR_ENTRY_POINT: &str = "aurora.monitors.capacity_threshold";
/// Snapshot file the monitor reads
pub const MONITOR_SNAPSHOT_FILE: &str = "snapshot.json";

/// Opaque identifier of a submitted workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowHandle(pub Uuid);

impl WorkflowHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cycler code registered in the engine, looked up by label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeHandle {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleNode {
    pub uuid: Uuid,
    pub sample: Sample,
}

impl SampleNode {
    pub fn new(sample: &Sample) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            sample: sample.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolNode {
    pub label: String,
    pub method: Vec<Technique>,
}

impl ProtocolNode {
    pub fn new(protocol: &Protocol) -> Self {
        Self {
            label: protocol.name.clone(),
            method: protocol.method.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsNode {
    pub verbosity: Verbosity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    pub unlock_when_done: bool,
}

impl SettingsNode {
    /// Settings node with the unlock flag decided by the caller
    pub fn new(control: &ControlSettings, unlock_when_done: bool) -> Self {
        Self {
            verbosity: control.verbosity,
            snapshot: control.snapshot.clone(),
            unlock_when_done,
        }
    }
}

/// Monitor parameters without the polling interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorCheck {
    pub check_type: CheckType,
    pub threshold: f64,
    pub consecutive_cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorKwargs {
    pub settings: MonitorCheck,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub entry_point: String,
    pub minimum_poll_interval: u32,
    pub kwargs: MonitorKwargs,
}

impl From<&Monitor> for MonitorRecord {
    fn from(monitor: &Monitor) -> Self {
        Self {
            entry_point: MONITOR_ENTRY_POINT.to_string(),
            minimum_poll_interval: monitor.refresh_rate,
            kwargs: MonitorKwargs {
                settings: MonitorCheck {
                    check_type: monitor.check_type,
                    threshold: monitor.threshold,
                    consecutive_cycles: monitor.consecutive_cycles,
                },
                filename: MONITOR_SNAPSHOT_FILE.to_string(),
            },
        }
    }
}

/// Everything the engine needs to run one sample through the protocol sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionBundle {
    pub battery_sample: SampleNode,
    pub tomato_code: CodeHandle,
    pub protocol_order: Vec<String>,
    pub protocols: BTreeMap<String, ProtocolNode>,
    pub control_settings: BTreeMap<String, SettingsNode>,
    pub monitor_settings: BTreeMap<String, BTreeMap<String, MonitorRecord>>,
    pub group_label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monitor_record_shape() {
        let monitor = Monitor {
            refresh_rate: 120,
            check_type: CheckType::DischargeCapacity,
            threshold: 0.75,
            consecutive_cycles: 3,
        };
        let value = serde_json::to_value(MonitorRecord::from(&monitor)).unwrap();
        assert_eq!(
            value,
            json!({
                "entry_point": "aurora.monitors.capacity_threshold",
                "minimum_poll_interval": 120,
                "kwargs": {
                    "settings": {
                        "check_type": "discharge_capacity",
                        "threshold": 0.75,
                        "consecutive_cycles": 3
                    },
                    "filename": "snapshot.json"
                }
            })
        );
    }

    #[test]
    fn test_handles_are_unique() {
        assert_ne!(WorkflowHandle::new(), WorkflowHandle::new());
    }
}
