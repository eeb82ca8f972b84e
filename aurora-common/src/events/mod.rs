//! Event types for the Aurora event system
//!
//! Provides shared event definitions and the EventBus used to publish
//! application-level events to host subscribers (UI, loggers). Fine-grained
//! attribute changes go through [`crate::observable::Observable`] instead.

mod composer_types;

pub use composer_types::{InventoryKind, SelectionField};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Workflow handles travel as plain strings at this layer
pub type WorkflowId = String;

/// Aurora event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to a front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuroraEvent {
    /// An inventory cache was rebuilt
    ///
    /// Triggers:
    /// - UI: refresh inventory tables and filter facets
    InventoryUpdated {
        inventory: InventoryKind,
        /// Value of the inventory's `updated` counter after the rebuild
        revision: u64,
        /// Number of records after the rebuild
        records: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Composer selection changed
    SelectionChanged {
        field: SelectionField,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Validity gate ran on a preview request
    ///
    /// Triggers:
    /// - UI: enable or disable the submit button, show the notice
    PreviewGenerated {
        valid: bool,
        /// Human-readable reason for the first failing check
        reason: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One per-sample experiment was accepted by the workflow engine
    ExperimentSubmitted {
        sample_id: u32,
        workflow: WorkflowId,
        label: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One per-sample submission failed; the batch continued
    SubmissionFailed {
        sample_id: u32,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Robot CSV import added samples
    SamplesImported {
        batch: String,
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast channel for [`AuroraEvent`]s
///
/// Cloning shares the channel. Emitting never blocks and needs no runtime;
/// a subscriber that falls more than `capacity` events behind loses the
/// oldest ones.
///
/// ```
/// use aurora_common::events::{AuroraEvent, EventBus};
/// use tokio::sync::broadcast::error::TryRecvError;
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(AuroraEvent::SamplesImported {
///     batch: "230101".to_string(),
///     count: 8,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(AuroraEvent::SamplesImported { count: 8, .. })));
/// assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuroraEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receiver for events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuroraEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers; dropped when there are none
    pub fn emit_lossy(&self, event: AuroraEvent) {
        let _ = self.tx.send(event);
    }
}
