//! Storage backend for inventory documents
//!
//! An inventory is persisted as one JSON document: a top-level array of
//! records. Reads never fail upward: a missing or corrupt document is logged
//! and read as empty. Writes replace the whole document through a temporary
//! file and a rename, so a crash leaves either the old or the new document.
//! There is no locking; concurrent writers race last-writer-wins.

pub mod encoding;

use crate::error::{ComposerError, ComposerResult};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Scoped read/write of an inventory document
pub trait StorageBackend: fmt::Debug {
    /// Ensure the backing document exists (an empty array if new)
    fn init(&self) -> ComposerResult<()>;

    /// Read all records, reporting failures
    fn try_fetch(&self) -> ComposerResult<Vec<Value>>;

    /// Overwrite the document with `records`, reporting failures
    fn try_save(&self, records: &[Value]) -> ComposerResult<()>;

    /// Read all records; failures are logged and read as empty
    fn fetch(&self) -> Vec<Value> {
        match self.try_fetch() {
            Ok(records) => records,
            Err(e) => {
                error!("{} ({:?}), treating as empty", e, self);
                Vec::new()
            }
        }
    }

    /// Overwrite the document; failures are logged and ignored
    ///
    /// Returns whether the write went through.
    fn save(&self, records: &[Value]) -> bool {
        match self.try_save(records) {
            Ok(()) => true,
            Err(e) => {
                error!("{} ({:?}), changes not persisted", e, self);
                false
            }
        }
    }
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for JsonStorage {
    fn init(&self) -> ComposerResult<()> {
        if self.path.exists() {
            return Ok(());
        }
        info!("Creating empty inventory document {}", self.path.display());
        self.try_save(&[])
    }

    fn try_fetch(&self) -> ComposerResult<Vec<Value>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ComposerError::Storage(format!("read {} failed: {}", self.path.display(), e))
        })?;
        let document: Value = serde_json::from_str(&text).map_err(|e| {
            ComposerError::Storage(format!("parse {} failed: {}", self.path.display(), e))
        })?;
        match document {
            Value::Array(records) => {
                debug!("Fetched {} records from {}", records.len(), self.path.display());
                Ok(records)
            }
            other => Err(ComposerError::Storage(format!(
                "{} must hold an array of records, found {}",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn try_save(&self, records: &[Value]) -> ComposerResult<()> {
        let io_err = |action: &str, e: std::io::Error| {
            ComposerError::Storage(format!("{} {} failed: {}", action, self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_err("create folder for", e))?;
        }

        let text = serde_json::to_string_pretty(records)
            .map_err(|e| ComposerError::Storage(format!("encode failed: {}", e)))?;
        let temp = self.temp_path();
        std::fs::write(&temp, text).map_err(|e| io_err("write", e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| io_err("replace", e))?;

        debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// In-process document, used by detached working copies and tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: RefCell<Option<Vec<Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            document: RefCell::new(Some(records)),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn init(&self) -> ComposerResult<()> {
        self.document.borrow_mut().get_or_insert_with(Vec::new);
        Ok(())
    }

    fn try_fetch(&self) -> ComposerResult<Vec<Value>> {
        self.document
            .borrow()
            .clone()
            .ok_or_else(|| ComposerError::Storage("memory document not initialised".to_string()))
    }

    fn try_save(&self, records: &[Value]) -> ComposerResult<()> {
        *self.document.borrow_mut() = Some(records.to_vec());
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
