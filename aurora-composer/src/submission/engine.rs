//! Workflow engine seam
//!
//! The engine is external. It accepts submission bundles, hands back
//! workflow handles, and keeps named groups of sample nodes and workflows.
//! Groups are get-or-create and adding a member twice is a no-op.

use super::nodes::{CodeHandle, SubmissionBundle, WorkflowHandle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Code not found: {0}")]
    CodeNotFound(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Member of an engine group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GroupMember {
    Sample(Uuid),
    Workflow(WorkflowHandle),
}

pub trait WorkflowEngine {
    /// Look up the cycler code registered under `label`
    fn load_code(&mut self, label: &str) -> Result<CodeHandle, EngineError>;

    /// Add `member` to `group`, creating the group on first use
    fn add_to_group(&mut self, group: &str, member: GroupMember) -> Result<(), EngineError>;

    fn submit(&mut self, bundle: &SubmissionBundle) -> Result<WorkflowHandle, EngineError>;

    fn label_workflow(&mut self, handle: &WorkflowHandle, label: &str) -> Result<(), EngineError>;
}

/// Engine kept in memory; records everything it is given
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    codes: BTreeSet<String>,
    accept_any_code: bool,
    groups: BTreeMap<String, Vec<GroupMember>>,
    submissions: Vec<(WorkflowHandle, SubmissionBundle)>,
    labels: BTreeMap<WorkflowHandle, String>,
}

impl InMemoryEngine {
    /// Engine that resolves any code label
    pub fn new() -> Self {
        Self {
            accept_any_code: true,
            ..Self::default()
        }
    }

    /// Engine that only knows the given code labels
    pub fn with_codes<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<GroupMember>> {
        &self.groups
    }

    pub fn group(&self, name: &str) -> &[GroupMember] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn submissions(&self) -> &[(WorkflowHandle, SubmissionBundle)] {
        &self.submissions
    }

    pub fn label_of(&self, handle: &WorkflowHandle) -> Option<&str> {
        self.labels.get(handle).map(String::as_str)
    }
}

impl WorkflowEngine for InMemoryEngine {
    fn load_code(&mut self, label: &str) -> Result<CodeHandle, EngineError> {
        if self.accept_any_code || self.codes.contains(label) {
            Ok(CodeHandle {
                label: label.to_string(),
            })
        } else {
            Err(EngineError::CodeNotFound(label.to_string()))
        }
    }

    fn add_to_group(&mut self, group: &str, member: GroupMember) -> Result<(), EngineError> {
        let members = self.groups.entry(group.to_string()).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
        Ok(())
    }

    fn submit(&mut self, bundle: &SubmissionBundle) -> Result<WorkflowHandle, EngineError> {
        let handle = WorkflowHandle::new();
        self.submissions.push((handle, bundle.clone()));
        debug!(%handle, sample = bundle.battery_sample.sample.id, "in-memory submission");
        Ok(handle)
    }

    fn label_workflow(&mut self, handle: &WorkflowHandle, label: &str) -> Result<(), EngineError> {
        self.labels.insert(*handle, label.to_string());
        Ok(())
    }
}

/// Engine writing bundles into a local folder
///
/// Layout:
/// - `<uuid>.json`: one pretty-printed bundle per workflow
/// - `groups.json`: group name to members
/// - `labels.json`: workflow handle to label
#[derive(Debug, Clone)]
pub struct DirectoryEngine {
    folder: PathBuf,
}

const GROUPS_FILE: &str = "groups.json";
const LABELS_FILE: &str = "labels.json";

impl DirectoryEngine {
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;
        info!("Workflow bundles will be written to {}", folder.display());
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn bundle_path(&self, handle: &WorkflowHandle) -> PathBuf {
        self.folder.join(format!("{}.json", handle))
    }

    fn read_map<V: serde::de::DeserializeOwned + Default>(&self, name: &str) -> Result<V, EngineError> {
        let path = self.folder.join(name);
        if !path.exists() {
            return Ok(V::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_map<V: Serialize>(&self, name: &str, value: &V) -> Result<(), EngineError> {
        let text = serde_json::to_string_pretty(value)?;
        std::fs::write(self.folder.join(name), text)?;
        Ok(())
    }

    pub fn groups(&self) -> Result<BTreeMap<String, Vec<GroupMember>>, EngineError> {
        self.read_map(GROUPS_FILE)
    }
}

impl WorkflowEngine for DirectoryEngine {
    /// Local runs have no code registry; any label resolves
    fn load_code(&mut self, label: &str) -> Result<CodeHandle, EngineError> {
        Ok(CodeHandle {
            label: label.to_string(),
        })
    }

    fn add_to_group(&mut self, group: &str, member: GroupMember) -> Result<(), EngineError> {
        let mut groups: BTreeMap<String, Vec<GroupMember>> = self.read_map(GROUPS_FILE)?;
        let members = groups.entry(group.to_string()).or_default();
        if !members.contains(&member) {
            members.push(member);
            self.write_map(GROUPS_FILE, &groups)?;
        }
        Ok(())
    }

    fn submit(&mut self, bundle: &SubmissionBundle) -> Result<WorkflowHandle, EngineError> {
        let handle = WorkflowHandle::new();
        let text = serde_json::to_string_pretty(bundle)?;
        std::fs::write(self.bundle_path(&handle), text)?;
        Ok(handle)
    }

    fn label_workflow(&mut self, handle: &WorkflowHandle, label: &str) -> Result<(), EngineError> {
        let mut labels: BTreeMap<String, String> = self.read_map(LABELS_FILE)?;
        labels.insert(handle.to_string(), label.to_string());
        self.write_map(LABELS_FILE, &labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_group_additions_are_idempotent() {
        let mut engine = InMemoryEngine::new();
        let member = GroupMember::Sample(Uuid::new_v4());
        engine.add_to_group("trial1", member.clone()).unwrap();
        engine.add_to_group("trial1", member).unwrap();
        assert_eq!(engine.group("trial1").len(), 1);
        assert!(engine.group("absent").is_empty());
    }

    #[test]
    fn test_code_registry() {
        let mut engine = InMemoryEngine::with_codes(["tomato@cycler"]);
        assert!(engine.load_code("tomato@cycler").is_ok());
        assert!(matches!(
            engine.load_code("other"),
            Err(EngineError::CodeNotFound(_))
        ));
    }

    #[test]
    fn test_directory_engine_groups_persist() {
        let dir = TempDir::new().unwrap();
        let mut engine = DirectoryEngine::new(dir.path().join("workflows")).unwrap();
        let handle = WorkflowHandle::new();
        engine.add_to_group("G/workflows", GroupMember::Workflow(handle)).unwrap();
        engine.add_to_group("G/workflows", GroupMember::Workflow(handle)).unwrap();
        engine.label_workflow(&handle, "Experiment run on B-1").unwrap();

        let reopened = DirectoryEngine::new(dir.path().join("workflows")).unwrap();
        let groups = reopened.groups().unwrap();
        assert_eq!(groups["G/workflows"], vec![GroupMember::Workflow(handle)]);
        let labels = std::fs::read_to_string(reopened.folder().join(LABELS_FILE)).unwrap();
        assert!(labels.contains("Experiment run on B-1"));
    }
}
