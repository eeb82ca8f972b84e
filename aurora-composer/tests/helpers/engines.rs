//! Workflow engines with injected failures

use aurora_composer::submission::{
    CodeHandle, EngineError, GroupMember, InMemoryEngine, SubmissionBundle, WorkflowEngine,
    WorkflowHandle,
};
use std::collections::BTreeSet;

/// In-memory engine that rejects submissions for chosen sample ids
pub struct FailingEngine {
    pub inner: InMemoryEngine,
    fail_for: BTreeSet<u32>,
    fail_labels: bool,
    fail_workflow_groups: bool,
}

impl FailingEngine {
    pub fn new(fail_for: &[u32]) -> Self {
        Self {
            inner: InMemoryEngine::new(),
            fail_for: fail_for.iter().copied().collect(),
            fail_labels: false,
            fail_workflow_groups: false,
        }
    }

    /// Accepts every workflow but rejects labelling it
    pub fn failing_labels() -> Self {
        Self {
            fail_labels: true,
            ..Self::new(&[])
        }
    }

    /// Accepts every workflow but rejects adding workflows to a group
    pub fn failing_workflow_groups() -> Self {
        Self {
            fail_workflow_groups: true,
            ..Self::new(&[])
        }
    }
}

impl WorkflowEngine for FailingEngine {
    fn load_code(&mut self, label: &str) -> Result<CodeHandle, EngineError> {
        self.inner.load_code(label)
    }

    fn add_to_group(&mut self, group: &str, member: GroupMember) -> Result<(), EngineError> {
        if self.fail_workflow_groups && matches!(member, GroupMember::Workflow(_)) {
            return Err(EngineError::Rejected(format!("group store down for {}", group)));
        }
        self.inner.add_to_group(group, member)
    }

    fn submit(&mut self, bundle: &SubmissionBundle) -> Result<WorkflowHandle, EngineError> {
        let id = bundle.battery_sample.sample.id;
        if self.fail_for.contains(&id) {
            return Err(EngineError::Rejected(format!("injected failure for sample {}", id)));
        }
        self.inner.submit(bundle)
    }

    fn label_workflow(&mut self, handle: &WorkflowHandle, label: &str) -> Result<(), EngineError> {
        if self.fail_labels {
            return Err(EngineError::Rejected("label store down".to_string()));
        }
        self.inner.label_workflow(handle, label)
    }
}
