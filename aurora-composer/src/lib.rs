//! aurora-composer library interface
//!
//! Experiment composition and submission for battery cycling:
//! inventories of samples and protocols, the composer selection and its
//! validity gate, and per-sample fan-out to a workflow engine.

pub mod composer;
pub mod editor;
pub mod error;
pub mod gate;
pub mod import;
pub mod inventory;
pub mod models;
pub mod query;
pub mod schema;
pub mod selection;
pub mod storage;
pub mod submission;

pub use crate::composer::Composer;
pub use crate::error::{ComposerError, ComposerResult};
pub use crate::inventory::{ProtocolInventory, SampleInventory, WriteOptions};
pub use crate::selection::Selection;
