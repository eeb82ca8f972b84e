//! Submission orchestrator
//!
//! Fans a selection out into one workflow per selected sample. Each
//! workflow runs that sample through the whole protocol sequence.
//!
//! # Per-sample steps
//! 1. Build the sample node and add it to each of the sample's groups
//! 2. Build protocol, settings and monitor nodes for every protocol, in order
//! 3. Submit the bundle
//! 4. Add the returned handle to the workflows group and label it
//!
//! A failure on one sample is recorded and the batch moves on. Nothing is
//! deduplicated: submitting the same selection again starts new workflows.
//! Once the engine has returned a handle the workflow is running, so a
//! failure in step 4 is kept as a warning on the submitted experiment
//! rather than turned into a failure.
//!
//! # Unlock policy
//! `unlock_when_done` is forced to `true` on every protocol but the last,
//! which gets the caller's flag, so the cycler is released once at the end
//! of the run and never between stages.

pub mod engine;
pub mod nodes;

pub use engine::{DirectoryEngine, EngineError, GroupMember, InMemoryEngine, WorkflowEngine};
pub use nodes::{
    CodeHandle, MonitorRecord, ProtocolNode, SampleNode, SettingsNode, SubmissionBundle,
    WorkflowHandle,
};

use crate::error::{ComposerError, ComposerResult};
use crate::inventory::{ProtocolInventory, SampleInventory};
use crate::models::{Protocol, Sample, Settings};
use crate::selection::Selection;
use aurora_common::events::{AuroraEvent, EventBus};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Name of the group collecting the workflows of a submission
pub fn workflows_group(group_label: &str) -> String {
    format!("{}/workflows", group_label)
}

/// Label given to each submitted workflow
pub fn workflow_label(sample: &Sample) -> String {
    format!("Experiment run on {}", sample.label())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedExperiment {
    pub sample_id: u32,
    pub handle: WorkflowHandle,
    pub label: String,
    /// Grouping or labelling steps that failed after the engine accepted the workflow
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionFailure {
    pub sample_id: u32,
    pub error: String,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionReport {
    pub submitted: Vec<SubmittedExperiment>,
    pub failures: Vec<SubmissionFailure>,
}

impl SubmissionReport {
    pub fn handles(&self) -> Vec<WorkflowHandle> {
        self.submitted.iter().map(|s| s.handle).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Submitted experiments whose bookkeeping did not fully reach the engine
    pub fn with_warnings(&self) -> impl Iterator<Item = &SubmittedExperiment> {
        self.submitted.iter().filter(|s| !s.warnings.is_empty())
    }
}

/// Build the bundle for one sample
///
/// `settings` must hold an entry for every protocol.
pub fn build_bundle(
    sample: &Sample,
    protocols: &[Protocol],
    settings: &BTreeMap<String, Settings>,
    code: &CodeHandle,
    unlock_when_done: bool,
    group_label: &str,
) -> ComposerResult<SubmissionBundle> {
    let mut bundle = SubmissionBundle {
        battery_sample: SampleNode::new(sample),
        tomato_code: code.clone(),
        protocol_order: protocols.iter().map(|p| p.name.clone()).collect(),
        protocols: BTreeMap::new(),
        control_settings: BTreeMap::new(),
        monitor_settings: BTreeMap::new(),
        group_label: group_label.to_string(),
    };

    let last = protocols.len().saturating_sub(1);
    for (i, protocol) in protocols.iter().enumerate() {
        let name = &protocol.name;
        let protocol_settings = settings
            .get(name)
            .ok_or_else(|| ComposerError::NotFound(format!("settings for protocol {:?}", name)))?;

        let unlock = if i == last { unlock_when_done } else { true };

        bundle.protocols.insert(name.clone(), ProtocolNode::new(protocol));
        bundle
            .control_settings
            .insert(name.clone(), SettingsNode::new(&protocol_settings.settings, unlock));
        bundle.monitor_settings.insert(
            name.clone(),
            protocol_settings
                .monitors
                .iter()
                .map(|(monitor_name, m)| (monitor_name.clone(), MonitorRecord::from(m)))
                .collect(),
        );
    }
    Ok(bundle)
}

/// Submits composed experiments to a workflow engine
pub struct SubmissionOrchestrator {
    code_label: String,
    events: Option<EventBus>,
}

impl SubmissionOrchestrator {
    pub fn new(code_label: impl Into<String>) -> Self {
        Self {
            code_label: code_label.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: AuroraEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }

    /// Submit the selection, one workflow per selected sample
    ///
    /// Refused as a whole when the selection fails the gate, a selected
    /// protocol is missing from the inventory, a protocol or settings bundle
    /// does not validate, or the code cannot be loaded. Once fan-out starts,
    /// per-sample failures are collected in the report.
    pub fn submit(
        &self,
        engine: &mut dyn WorkflowEngine,
        selection: &Selection,
        samples: &SampleInventory,
        protocols: &ProtocolInventory,
        unlock_when_done: bool,
        group_label: &str,
    ) -> ComposerResult<SubmissionReport> {
        let verdict = selection.verdict();
        if let Some(reason) = verdict.reason() {
            return Err(ComposerError::SubmissionRefused(reason.to_string()));
        }

        // Resolve everything before dispatch
        let selected_protocols = selection.get_protocols(protocols);
        if selected_protocols.len() != selection.protocols().get().len() {
            return Err(ComposerError::SubmissionRefused(
                "a selected protocol is no longer in the inventory".to_string(),
            ));
        }
        for protocol in &selected_protocols {
            protocol
                .validate()
                .map_err(|e| ComposerError::SubmissionRefused(e.to_string()))?;
        }
        let settings = selection.settings().get();
        for (name, s) in settings {
            s.validate()
                .map_err(|e| ComposerError::SubmissionRefused(format!("settings for {:?}: {}", name, e)))?;
        }

        let code = engine.load_code(&self.code_label).map_err(|e| {
            ComposerError::SubmissionRefused(format!("cannot load code {:?}: {}", self.code_label, e))
        })?;

        let mut report = SubmissionReport::default();
        for id in selection.samples().get() {
            let outcome = match samples.get(*id) {
                Some(sample) => self.submit_one(
                    engine,
                    sample,
                    &selected_protocols,
                    settings,
                    &code,
                    unlock_when_done,
                    group_label,
                ),
                None => Err(ComposerError::NotFound(format!("sample {}", id))),
            };

            match outcome {
                Ok(done) => {
                    info!("Submitted sample {} as workflow {}", done.sample_id, done.handle);
                    self.emit(AuroraEvent::ExperimentSubmitted {
                        sample_id: done.sample_id,
                        workflow: done.handle.to_string(),
                        label: done.label.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    report.submitted.push(done);
                }
                Err(e) => {
                    error!("Submission failed for sample {}: {}", id, e);
                    self.emit(AuroraEvent::SubmissionFailed {
                        sample_id: *id,
                        error: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    report.failures.push(SubmissionFailure {
                        sample_id: *id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.is_complete() {
            warn!(
                "{} of {} submissions failed",
                report.failures.len(),
                report.failures.len() + report.submitted.len()
            );
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_one(
        &self,
        engine: &mut dyn WorkflowEngine,
        sample: &Sample,
        protocols: &[Protocol],
        settings: &BTreeMap<String, Settings>,
        code: &CodeHandle,
        unlock_when_done: bool,
        group_label: &str,
    ) -> ComposerResult<SubmittedExperiment> {
        let failed = |e: EngineError| ComposerError::Submission {
            sample_id: sample.id,
            message: e.to_string(),
        };

        let bundle = build_bundle(sample, protocols, settings, code, unlock_when_done, group_label)?;

        let node = GroupMember::Sample(bundle.battery_sample.uuid);
        for group in &sample.metadata.groups {
            engine.add_to_group(group, node.clone()).map_err(failed)?;
        }

        let handle = engine.submit(&bundle).map_err(failed)?;
        let label = workflow_label(sample);
        let mut warnings = Vec::new();
        let group = workflows_group(group_label);
        if let Err(e) = engine.add_to_group(&group, GroupMember::Workflow(handle)) {
            warn!("Workflow {} is running but was not added to {:?}: {}", handle, group, e);
            warnings.push(format!("not added to group {:?}: {}", group, e));
        }
        if let Err(e) = engine.label_workflow(&handle, &label) {
            warn!("Workflow {} is running but was not labelled: {}", handle, e);
            warnings.push(format!("not labelled: {}", e));
        }

        Ok(SubmittedExperiment {
            sample_id: sample.id,
            handle,
            label,
            warnings,
        })
    }
}
