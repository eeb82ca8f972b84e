//! Per-protocol control and monitor settings

use crate::error::{ComposerError, ComposerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_SNAPSHOT_FREQUENCY: u32 = 10;
pub const MIN_REFRESH_RATE: u32 = 10;
pub const MIN_CONSECUTIVE_CYCLES: u32 = 2;

pub const DEFAULT_SNAPSHOT_FREQUENCY: u32 = 3600;
pub const DEFAULT_SNAPSHOT_PREFIX: &str = "snapshot";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verbosity::Debug => "DEBUG",
            Verbosity::Info => "INFO",
            Verbosity::Warning => "WARNING",
            Verbosity::Error => "ERROR",
            Verbosity::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds between snapshots
    pub frequency: u32,
    pub prefix: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_SNAPSHOT_FREQUENCY,
            prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSettings {
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default)]
    pub unlock_when_done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    DischargeCapacity,
    ChargeCapacity,
}

/// Capacity-threshold monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Seconds between checks
    pub refresh_rate: u32,
    pub check_type: CheckType,
    /// Fraction of the initial capacity below which the job is stopped
    pub threshold: f64,
    pub consecutive_cycles: u32,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            refresh_rate: 600,
            check_type: CheckType::DischargeCapacity,
            threshold: 0.8,
            consecutive_cycles: 2,
        }
    }
}

impl Monitor {
    pub fn validate(&self) -> ComposerResult<()> {
        if self.refresh_rate < MIN_REFRESH_RATE {
            return Err(ComposerError::Validation(format!(
                "refresh_rate must be at least {} s, got {}",
                MIN_REFRESH_RATE, self.refresh_rate
            )));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ComposerError::Validation(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.consecutive_cycles < MIN_CONSECUTIVE_CYCLES {
            return Err(ComposerError::Validation(format!(
                "consecutive_cycles must be at least {}, got {}",
                MIN_CONSECUTIVE_CYCLES, self.consecutive_cycles
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub settings: ControlSettings,
    #[serde(default)]
    pub monitors: BTreeMap<String, Monitor>,
}

impl Settings {
    /// Bundle control and monitors, adding the default snapshot when monitors are present
    pub fn new(control: ControlSettings, monitors: BTreeMap<String, Monitor>) -> Self {
        Self {
            settings: control,
            monitors,
        }
        .with_defaults()
    }

    /// Monitors read snapshots, so they need one; install the default if absent
    pub fn with_defaults(mut self) -> Self {
        if !self.monitors.is_empty() && self.settings.snapshot.is_none() {
            self.settings.snapshot = Some(Snapshot::default());
        }
        self
    }

    pub fn validate(&self) -> ComposerResult<()> {
        if let Some(snapshot) = &self.settings.snapshot {
            if snapshot.frequency < MIN_SNAPSHOT_FREQUENCY {
                return Err(ComposerError::Validation(format!(
                    "snapshot frequency must be at least {} s, got {}",
                    MIN_SNAPSHOT_FREQUENCY, snapshot.frequency
                )));
            }
        }
        for (name, monitor) in &self.monitors {
            monitor
                .validate()
                .map_err(|e| ComposerError::Validation(format!("monitor {:?}: {}", name, e)))?;
        }
        Ok(())
    }
}
