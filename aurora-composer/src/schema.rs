//! Schema validation of raw inventory records
//!
//! The only way raw documents become trusted typed records. Each record is
//! decoded, normalised and checked; failures are logged and the record is
//! dropped.

use crate::error::{ComposerError, ComposerResult};
use crate::models::protocol::is_valid_protocol_name;
use crate::models::{Protocol, Sample, ALL_SAMPLES};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// A typed record that can be validated from a raw document entry
pub trait Schema: DeserializeOwned + Serialize + Sized {
    /// Record kind, used in log messages
    const KIND: &'static str;

    /// Key identifying the record in messages
    fn key(&self) -> String;

    /// Fill in invariants that can be repaired
    fn normalize(&mut self) {}

    /// Reject records that break invariants
    fn check(&self) -> ComposerResult<()> {
        Ok(())
    }
}

impl Schema for Sample {
    const KIND: &'static str = "sample";

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn normalize(&mut self) {
        self.metadata.groups.insert(ALL_SAMPLES.to_string());
    }

    fn check(&self) -> ComposerResult<()> {
        let capacity = self.specs.capacity.nominal;
        if !(capacity > 0.0) {
            return Err(ComposerError::Validation(format!(
                "sample {}: nominal capacity must be positive, got {}",
                self.id, capacity
            )));
        }
        let number = self
            .metadata
            .name
            .strip_prefix(self.metadata.batch.as_str())
            .and_then(|rest| rest.strip_prefix('-'));
        if !matches!(number, Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())) {
            return Err(ComposerError::Validation(format!(
                "sample {}: name {:?} must be \"{}-<number>\"",
                self.id, self.metadata.name, self.metadata.batch
            )));
        }
        Ok(())
    }
}

impl Schema for Protocol {
    const KIND: &'static str = "protocol";

    fn key(&self) -> String {
        self.name.clone()
    }

    fn check(&self) -> ComposerResult<()> {
        if !is_valid_protocol_name(&self.name) {
            return Err(ComposerError::NameInvalid(self.name.clone()));
        }
        if self.method.is_empty() {
            return Err(ComposerError::Validation(format!(
                "protocol {:?} has no techniques",
                self.name
            )));
        }
        // Required values may still be blank while a protocol is being drafted
        self.method.iter().try_for_each(|t| t.check_structure())
    }
}

/// Normalise and check an already-typed record
pub fn prepare<S: Schema>(mut record: S) -> ComposerResult<S> {
    record.normalize();
    record.check()?;
    Ok(record)
}

/// Decode and validate one raw record, reporting the failure
pub fn try_validate<S: Schema>(record: &Value) -> ComposerResult<S> {
    let typed: S = serde_json::from_value(record.clone())
        .map_err(|e| ComposerError::Validation(format!("invalid {}: {}", S::KIND, e)))?;
    prepare(typed)
}

/// Decode and validate one raw record; `None` (logged) when it does not conform
pub fn validate<S: Schema>(record: &Value) -> Option<S> {
    match try_validate(record) {
        Ok(typed) => Some(typed),
        Err(e) => {
            warn!("Dropping {} record: {}", S::KIND, e);
            None
        }
    }
}

/// Keep the records that validate, dropping (and logging) the rest
pub fn get_valid<S: Schema>(records: &[Value]) -> Vec<S> {
    let valid: Vec<S> = records.iter().filter_map(validate).collect();
    if valid.len() != records.len() {
        warn!(
            "{} of {} {} records failed validation",
            records.len() - valid.len(),
            records.len(),
            S::KIND
        );
    }
    valid
}
