//! Data models for the experiment composer
//!
//! - Sample: a physical cell and its specification
//! - Protocol: a named ordered sequence of techniques
//! - Technique catalogue: the closed set of electrochemical steps
//! - Settings: per-protocol control and monitor bundle

pub mod protocol;
pub mod sample;
pub mod settings;
pub mod technique;

pub use protocol::{Parameter, Protocol, Scalar, ScalarType, Technique};
pub use sample::{
    Capacity, Composition, Electrode, ElectrodeCapacity, Electrolyte, Sample, SampleMetadata,
    SampleSpecs, Separator, Weight, ALL_SAMPLES,
};
pub use settings::{CheckType, ControlSettings, Monitor, Settings, Snapshot, Verbosity};
pub use technique::TechniqueKind;
