//! Experiment composer
//!
//! Single entry point for composing and submitting experiments. Owns the
//! selection, the composer's sample filter and its facets; inventories and
//! the engine are passed in per call. Application-level events go out on
//! the [`EventBus`].

use crate::error::{ComposerError, ComposerResult};
use crate::gate::{Preview, Verdict};
use crate::inventory::table::{BATCH_COLUMN, GROUPS_COLUMN, SUBBATCH_COLUMN};
use crate::inventory::{ProtocolInventory, SampleInventory, Table};
use crate::models::Settings;
use crate::query::{FacetPanel, Predicate};
use crate::selection::Selection;
use crate::submission::{SubmissionOrchestrator, SubmissionReport, WorkflowEngine};
use aurora_common::events::{AuroraEvent, EventBus, SelectionField};
use aurora_common::observable::Observable;
use tracing::{info, warn};

/// Columns offered as filters in the composer's sample list
pub const DEFAULT_FACET_FIELDS: &[&str] = &[
    BATCH_COLUMN,
    SUBBATCH_COLUMN,
    GROUPS_COLUMN,
    "specs.case",
    "specs.composition.cathode.formula",
    "specs.composition.anode.formula",
];

pub struct Composer {
    selection: Selection,
    events: EventBus,
    orchestrator: SubmissionOrchestrator,
    submitting: Observable<bool>,
    filter: Predicate,
    facets: FacetPanel,
}

impl Composer {
    pub fn new(events: EventBus, code_label: impl Into<String>) -> Self {
        Self {
            selection: Selection::new(),
            orchestrator: SubmissionOrchestrator::new(code_label).with_events(events.clone()),
            events,
            submitting: Observable::new("submitting", false),
            filter: Predicate::default(),
            facets: FacetPanel::new(DEFAULT_FACET_FIELDS),
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Raised while a submission is running, for observers to disable submit controls
    pub fn submitting(&self) -> &Observable<bool> {
        &self.submitting
    }

    pub fn facets(&self) -> &FacetPanel {
        &self.facets
    }

    pub fn filter(&self) -> &Predicate {
        &self.filter
    }

    fn selection_changed(&self, field: SelectionField) {
        self.events.emit_lossy(AuroraEvent::SelectionChanged {
            field,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn select_samples(&mut self, ids: &[u32]) {
        self.selection.select_samples(ids);
        self.selection_changed(SelectionField::Samples);
    }

    pub fn deselect_samples(&mut self, ids: &[u32]) {
        self.selection.deselect_samples(ids);
        self.selection_changed(SelectionField::Samples);
    }

    pub fn select_protocols(&mut self, names: &[String]) {
        self.selection.select_protocols(names);
        self.selection_changed(SelectionField::Protocols);
    }

    pub fn deselect_protocols(&mut self, names: &[String]) {
        self.selection.deselect_protocols(names);
        self.selection_changed(SelectionField::Protocols);
    }

    pub fn save_settings(&mut self, protocol: &str, settings: Settings) -> ComposerResult<()> {
        self.selection.save_settings(protocol, settings)?;
        self.selection_changed(SelectionField::Settings);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.selection.reset();
        self.selection_changed(SelectionField::Reset);
    }

    /// Run the validity gate and publish the verdict
    pub fn signal_preview(&mut self) -> Verdict {
        let verdict = self.selection.signal_preview();
        match verdict.reason() {
            Some(reason) => info!("Preview: {}", reason),
            None => info!("Preview: selection is valid"),
        }
        self.events.emit_lossy(AuroraEvent::PreviewGenerated {
            valid: verdict.is_valid(),
            reason: verdict.reason().map(str::to_string),
            timestamp: chrono::Utc::now(),
        });
        verdict
    }

    pub fn preview(&self, samples: &SampleInventory, protocols: &ProtocolInventory) -> Preview {
        Preview::materialize(&self.selection, samples, protocols)
    }

    /// Samples matching the composer filter
    pub fn filtered_samples(&self, samples: &SampleInventory) -> Table {
        samples.query(&self.filter, None)
    }

    /// Replace the sample filter and recompute the facets
    pub fn set_filter(&mut self, predicate: Predicate, samples: &SampleInventory) {
        self.filter = predicate;
        self.refresh_facets(samples);
    }

    pub fn refresh_facets(&mut self, samples: &SampleInventory) {
        self.facets.refresh(samples.table(), &self.filter);
    }

    /// Submit the current selection
    ///
    /// Refused unless `valid_input` is set. `submitting` is raised around
    /// the fan-out only; `&mut self` already rules out overlapping calls.
    pub fn submit(
        &mut self,
        engine: &mut dyn WorkflowEngine,
        samples: &SampleInventory,
        protocols: &ProtocolInventory,
        unlock_when_done: bool,
        group_label: &str,
    ) -> ComposerResult<SubmissionReport> {
        if !*self.selection.valid_input().get() {
            let reason = self
                .selection
                .verdict()
                .reason()
                .unwrap_or("selection is not valid");
            warn!("Submit refused: {}", reason);
            return Err(ComposerError::SubmissionRefused(reason.to_string()));
        }

        self.submitting.set(true);
        let result = self.orchestrator.submit(
            engine,
            &self.selection,
            samples,
            protocols,
            unlock_when_done,
            group_label,
        );
        self.submitting.set(false);

        if let Ok(report) = &result {
            info!(
                "Submission finished: {} started, {} failed",
                report.submitted.len(),
                report.failures.len()
            );
        }
        result
    }
}
