//! Error types for aurora-composer
//!
//! Key and name errors refuse the operation at its boundary. Validation and
//! storage problems are normally recovered where they happen (record dropped,
//! empty read) and only surface here when a caller asks for strict behaviour.

use thiserror::Error;

/// Composer error type
#[derive(Debug, Error)]
pub enum ComposerError {
    /// Record does not conform to its schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Insert of a sample whose id already exists
    #[error("Duplicate sample id: {0}")]
    DuplicateId(u32),

    /// Insert of a protocol whose name already exists
    #[error("Duplicate protocol name: {0}")]
    DuplicateName(String),

    /// Delete or lookup of a missing key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Protocol name does not match ^[A-Za-z0-9_]+$
    #[error("Invalid protocol name: {0:?} (letters, digits and underscores only)")]
    NameInvalid(String),

    /// Protocol name already present when saving from the editor
    #[error("Protocol name already exists: {0}")]
    NameExists(String),

    /// Editor refused to remove the only remaining step
    #[error("A protocol needs at least one technique")]
    LastStep,

    /// Editor operation needs a selected technique
    #[error("No technique selected")]
    NoSelection,

    /// Robot CSV import with a batch label already in the inventory
    #[error("Batch already exists: {0}")]
    BatchExists(String),

    /// Robot CSV could not be interpreted
    #[error("Import error: {0}")]
    Import(String),

    /// Storage backend read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Per-sample submission failure
    #[error("Submission failed for sample {sample_id}: {message}")]
    Submission { sample_id: u32, message: String },

    /// Submission refused before fan-out started
    #[error("Submission refused: {0}")]
    SubmissionRefused(String),

    /// aurora-common error
    #[error("Common error: {0}")]
    Common(#[from] aurora_common::Error),
}

/// Result type for composer operations
pub type ComposerResult<T> = Result<T, ComposerError>;
