//! Robot CSV import
//!
//! The assembly robot exports one semicolon-separated row per cell, with a
//! header row. Each row becomes a sample of the chosen batch:
//!
//! - id: highest existing id + `Battery_Number`
//! - name: `"{batch}-{Battery_Number}"`
//! - electrode net weight: total - collector (mg)
//! - electrode capacity: net (mg) x practical capacity (mAh/g) / 1000 (mAh)
//! - nominal capacity: min of the two electrodes, rounded to 3 decimals
//!
//! The import is all-or-nothing.

use crate::error::{ComposerError, ComposerResult};
use crate::inventory::{SampleInventory, WriteOptions};
use crate::models::{
    Capacity, Composition, Electrode, Electrolyte, Sample, SampleMetadata, SampleSpecs,
    Separator, Weight, ALL_SAMPLES,
};
use aurora_common::events::{AuroraEvent, EventBus};
use aurora_common::time::local_now;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const DELIMITER: char = ';';
pub const CREATION_PROCESS: &str = "robot";

pub mod columns {
    pub const BATTERY_NUMBER: &str = "Battery_Number";
    pub const CASING_TYPE: &str = "Casing Type";
    pub const ANODE_TYPE: &str = "Anode Type";
    pub const ANODE_WEIGHT: &str = "Anode Weight";
    pub const ANODE_DIAMETER: &str = "Anode Diameter";
    pub const ANODE_COLLECTOR_WEIGHT: &str = "Anode Current Collector Weight (mg)";
    pub const ANODE_PRACTICAL_CAPACITY: &str = "Anode Practical Capacity (mAh/g)";
    pub const ANODE_POSITION: &str = "Anode Position";
    pub const CATHODE_TYPE: &str = "Cathode Type";
    pub const CATHODE_WEIGHT: &str = "Cathode Weight (mg)";
    pub const CATHODE_DIAMETER: &str = "Cathode Diameter (mm)";
    pub const CATHODE_COLLECTOR_WEIGHT: &str = "Cathode Current Collector Weight (mg)";
    pub const CATHODE_PRACTICAL_CAPACITY: &str = "Cathode Practical Capacity (mAh/g)";
    pub const CATHODE_POSITION: &str = "Cathode Position";
    pub const ELECTROLYTE: &str = "Electrolyte";
    pub const ELECTROLYTE_POSITION: &str = "Electrolyte Position";
    pub const ELECTROLYTE_AMOUNT: &str = "Electrolyte Amount";
    pub const SEPARATOR: &str = "Separator";
    pub const SEPARATOR_DIAMETER: &str = "Separator Diameter (mm)";
    pub const SPACER: &str = "Spacer (mm)";
    pub const SUBBATCH: &str = "Subbatch";
}

use columns::*;

/// One data row, keyed by header
#[derive(Debug, Clone, PartialEq)]
pub struct RobotRow {
    /// 1-based line number in the file
    pub line: usize,
    fields: BTreeMap<String, String>,
}

impl RobotRow {
    /// Trimmed field; empty fields read as absent
    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn error(&self, column: &str, problem: &str) -> ComposerError {
        ComposerError::Import(format!("line {}, column {:?}: {}", self.line, column, problem))
    }

    fn number(&self, column: &str) -> ComposerResult<Option<f64>> {
        match self.text(column) {
            None => Ok(None),
            // Decimal commas come from spreadsheet locales
            Some(raw) => raw
                .replace(',', ".")
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.error(column, &format!("{:?} is not a number", raw))),
        }
    }

    fn required_number(&self, column: &str) -> ComposerResult<f64> {
        self.number(column)?
            .ok_or_else(|| self.error(column, "value missing"))
    }

    fn optional_number(&self, column: &str) -> ComposerResult<f64> {
        Ok(self.number(column)?.unwrap_or(0.0))
    }

    fn position(&self, column: &str) -> ComposerResult<u32> {
        match self.text(column) {
            None => Ok(0),
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| self.error(column, &format!("{:?} is not a position", raw))),
        }
    }

    fn required_text(&self, column: &str) -> ComposerResult<String> {
        self.text(column)
            .map(str::to_string)
            .ok_or_else(|| self.error(column, "value missing"))
    }

    pub fn battery_number(&self) -> ComposerResult<u32> {
        let raw = self
            .text(BATTERY_NUMBER)
            .ok_or_else(|| self.error(BATTERY_NUMBER, "value missing"))?;
        raw.parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| self.error(BATTERY_NUMBER, &format!("{:?} is not a positive integer", raw)))
    }
}

/// Split the file into rows keyed by the header
pub fn parse(text: &str) -> ComposerResult<Vec<RobotRow>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some((_, line)) => line.split(DELIMITER).map(|h| h.trim().to_string()).collect(),
        None => return Err(ComposerError::Import("file is empty".to_string())),
    };
    if !header.iter().any(|h| h == BATTERY_NUMBER) {
        return Err(ComposerError::Import(format!(
            "header has no {:?} column",
            BATTERY_NUMBER
        )));
    }

    lines
        .map(|(index, line)| {
            let values: Vec<&str> = line.split(DELIMITER).collect();
            if values.len() > header.len() {
                return Err(ComposerError::Import(format!(
                    "line {}: {} fields but the header has {}",
                    index + 1,
                    values.len(),
                    header.len()
                )));
            }
            let fields = header
                .iter()
                .cloned()
                .zip(values.iter().map(|v| v.to_string()))
                .collect();
            Ok(RobotRow {
                line: index + 1,
                fields,
            })
        })
        .collect()
}

fn electrode(
    row: &RobotRow,
    formula: &str,
    weight: &str,
    collector: &str,
    practical: &str,
    diameter: &str,
    position: &str,
) -> ComposerResult<Electrode> {
    let weight = Weight::from_total(row.required_number(weight)?, row.required_number(collector)?);
    if weight.net <= 0.0 {
        return Err(row.error(collector, "collector weighs as much as the electrode"));
    }
    let capacity = Electrode::capacity_from_practical(weight.net, row.required_number(practical)?);
    Ok(Electrode {
        formula: row.required_text(formula)?,
        position: row.position(position)?,
        diameter: row.optional_number(diameter)?,
        weight,
        capacity,
    })
}

/// Build the sample described by one row
pub fn build_sample(row: &RobotRow, batch: &str, base_id: u32, created: NaiveDateTime) -> ComposerResult<Sample> {
    let number = row.battery_number()?;
    let anode = electrode(
        row,
        ANODE_TYPE,
        ANODE_WEIGHT,
        ANODE_COLLECTOR_WEIGHT,
        ANODE_PRACTICAL_CAPACITY,
        ANODE_DIAMETER,
        ANODE_POSITION,
    )?;
    let cathode = electrode(
        row,
        CATHODE_TYPE,
        CATHODE_WEIGHT,
        CATHODE_COLLECTOR_WEIGHT,
        CATHODE_PRACTICAL_CAPACITY,
        CATHODE_DIAMETER,
        CATHODE_POSITION,
    )?;
    let capacity = Capacity::limiting(&anode.capacity, &cathode.capacity);
    if capacity.nominal <= 0.0 {
        return Err(row.error(ANODE_PRACTICAL_CAPACITY, "nominal capacity rounds to zero"));
    }

    let id = base_id
        .checked_add(number)
        .ok_or_else(|| row.error(BATTERY_NUMBER, "id out of range"))?;

    Ok(Sample {
        id,
        metadata: SampleMetadata {
            name: format!("{}-{}", batch, number),
            batch: batch.to_string(),
            subbatch: row.text(SUBBATCH).unwrap_or("0").to_string(),
            creation_datetime: created,
            creation_process: CREATION_PROCESS.to_string(),
            groups: BTreeSet::from([ALL_SAMPLES.to_string()]),
        },
        specs: SampleSpecs {
            manufacturer: String::new(),
            case: row.text(CASING_TYPE).unwrap_or_default().to_string(),
            capacity,
            composition: Composition {
                anode,
                cathode,
                electrolyte: Electrolyte {
                    formula: row.text(ELECTROLYTE).unwrap_or_default().to_string(),
                    position: row.position(ELECTROLYTE_POSITION)?,
                    amount: row.optional_number(ELECTROLYTE_AMOUNT)?,
                },
                separator: Separator {
                    name: row.text(SEPARATOR).unwrap_or_default().to_string(),
                    diameter: row.optional_number(SEPARATOR_DIAMETER)?,
                },
                spacer: row.optional_number(SPACER)?,
            },
        },
        extra: BTreeMap::new(),
    })
}

/// Import a robot file as batch `batch`; returns the new sample ids
pub fn import_batch(
    inventory: &mut SampleInventory,
    text: &str,
    batch: &str,
    opts: WriteOptions,
    events: Option<&EventBus>,
) -> ComposerResult<Vec<u32>> {
    let batch = batch.trim();
    if batch.is_empty() {
        return Err(ComposerError::Import("batch label is empty".to_string()));
    }
    if inventory.has_batch(batch) {
        warn!("Refusing import: batch {:?} already exists", batch);
        return Err(ComposerError::BatchExists(batch.to_string()));
    }

    let rows = parse(text)?;
    if rows.is_empty() {
        return Err(ComposerError::Import("file has no data rows".to_string()));
    }

    let base_id = inventory.highest_sample_id();
    let created = local_now();
    let samples = rows
        .iter()
        .map(|row| build_sample(row, batch, base_id, created))
        .collect::<ComposerResult<Vec<_>>>()?;
    let ids: Vec<u32> = samples.iter().map(|s| s.id).collect();

    inventory.add_many(samples, opts)?;
    info!("Imported {} samples as batch {:?}", ids.len(), batch);

    if let Some(events) = events {
        events.emit_lossy(AuroraEvent::SamplesImported {
            batch: batch.to_string(),
            count: ids.len(),
            timestamp: chrono::Utc::now(),
        });
    }
    Ok(ids)
}
