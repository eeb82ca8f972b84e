//! Test Helper Utilities
//!
//! Shared fixtures for aurora-composer integration tests

#![allow(dead_code)]

pub mod engines;
pub mod fixtures;

pub use engines::FailingEngine;
pub use fixtures::{
    json_inventories, memory_protocols, memory_samples, protocol, robot_csv, sample,
    sample_in_groups, settings, settings_with_monitor, JsonInventories,
};
