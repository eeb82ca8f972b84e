//! Protocol editor state machine
//!
//! The editor owns a draft protocol and a buffer holding the selected step.
//! Edits go to the buffer; `save_step` writes it back into the draft and
//! `discard_step` reloads it. Renaming the protocol does not drop the
//! selection, so a pending step edit survives `set_name` and is flushed
//! when the draft is saved.
//!
//! ```text
//!            select(i)               change_parameter / change_variant
//!   Idle ─────────────► Editing(i) ─────────────────────────────► DirtyStep(i)
//!                          ▲   ▲                                      │
//!                          │   └──────── save_step / discard_step ────┘
//!                          │
//!   set_name ──► DirtyName ┘ (select, or any step edit)
//! ```

use crate::error::{ComposerError, ComposerResult};
use crate::inventory::{ProtocolInventory, WriteOptions};
use crate::models::protocol::is_valid_protocol_name;
use crate::models::{Protocol, Scalar, Technique, TechniqueKind};
use aurora_common::observable::Observable;
use tracing::{debug, info, warn};

/// Technique used for new steps when none is given
pub const DEFAULT_STEP_KIND: TechniqueKind = TechniqueKind::OpenCircuitVoltage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Editing(usize),
    DirtyStep(usize),
    DirtyName,
}

pub struct ProtocolEditor {
    protocol: Protocol,
    buffer: Option<Technique>,
    /// Selected step, independent of the protocol name being dirty
    cursor: Option<usize>,
    state: Observable<EditorState>,
}

/// Step name `"{short}_{k}"` with `k` one past the steps of that kind already present
pub fn default_step_name(protocol: &Protocol, kind: TechniqueKind) -> String {
    format!("{}_{}", kind.short_name(), protocol.count_of(kind) + 1)
}

impl ProtocolEditor {
    /// Edit an existing protocol (typically a clone of an inventory record)
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            buffer: None,
            cursor: None,
            state: Observable::new("editor_state", EditorState::Idle),
        }
    }

    /// Unnamed protocol with one default step
    pub fn blank() -> Self {
        let mut protocol = Protocol::new("", Vec::new());
        let name = default_step_name(&protocol, DEFAULT_STEP_KIND);
        protocol.method.push(Technique::new(DEFAULT_STEP_KIND, name));
        Self::new(protocol)
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn state(&self) -> EditorState {
        *self.state.get()
    }

    /// Observable state, for binding controls
    pub fn state_observable(&self) -> &Observable<EditorState> {
        &self.state
    }

    /// The step being edited, including unsaved changes
    pub fn buffer(&self) -> Option<&Technique> {
        self.buffer.as_ref()
    }

    pub fn selected_step(&self) -> Option<usize> {
        self.cursor
    }

    /// True when the buffer differs from the draft step it was loaded from
    pub fn has_pending_step(&self) -> bool {
        match (self.cursor, &self.buffer) {
            (Some(i), Some(buffer)) => self.protocol.method.get(i) != Some(buffer),
            _ => false,
        }
    }

    fn transition(&mut self, next: EditorState) {
        if *self.state.get() != next {
            debug!(from = ?self.state.get(), to = ?next, "editor transition");
            self.state.set(next);
        }
    }

    fn selected(&self) -> ComposerResult<usize> {
        self.cursor.ok_or(ComposerError::NoSelection)
    }

    fn check_index(&self, index: usize) -> ComposerResult<()> {
        if index < self.protocol.method.len() {
            Ok(())
        } else {
            Err(ComposerError::NotFound(format!(
                "step {} (protocol has {})",
                index,
                self.protocol.method.len()
            )))
        }
    }

    /// Select a step; unsaved step edits are dropped
    pub fn select(&mut self, index: usize) -> ComposerResult<()> {
        self.check_index(index)?;
        if let EditorState::DirtyStep(previous) = self.state() {
            debug!(step = previous, "discarding unsaved step edits");
        }
        self.buffer = Some(self.protocol.method[index].clone());
        self.cursor = Some(index);
        self.transition(EditorState::Editing(index));
        Ok(())
    }

    pub fn change_parameter(&mut self, key: &str, value: Scalar) -> ComposerResult<()> {
        let index = self.selected()?;
        let buffer = self.buffer.as_mut().ok_or(ComposerError::NoSelection)?;
        buffer.set_parameter(key, value)?;
        self.transition(EditorState::DirtyStep(index));
        Ok(())
    }

    /// Switch the selected step to another technique; parameters restart at its defaults
    pub fn change_variant(&mut self, kind: TechniqueKind) -> ComposerResult<()> {
        let index = self.selected()?;
        let buffer = self.buffer.as_mut().ok_or(ComposerError::NoSelection)?;
        if buffer.kind() == kind {
            return Ok(());
        }
        buffer.change_variant(kind);
        self.transition(EditorState::DirtyStep(index));
        Ok(())
    }

    pub fn rename_step(&mut self, name: &str) -> ComposerResult<()> {
        let index = self.selected()?;
        let buffer = self.buffer.as_mut().ok_or(ComposerError::NoSelection)?;
        buffer.name = name.to_string();
        self.transition(EditorState::DirtyStep(index));
        Ok(())
    }

    pub fn save_step(&mut self) -> ComposerResult<()> {
        let index = self.selected()?;
        let buffer = self.buffer.clone().ok_or(ComposerError::NoSelection)?;
        self.protocol.method[index] = buffer;
        self.transition(EditorState::Editing(index));
        Ok(())
    }

    pub fn discard_step(&mut self) -> ComposerResult<()> {
        let index = self.selected()?;
        self.buffer = Some(self.protocol.method[index].clone());
        self.transition(EditorState::Editing(index));
        Ok(())
    }

    /// Append a default step of `kind` and select it
    pub fn add_step(&mut self, kind: TechniqueKind) -> usize {
        let name = default_step_name(&self.protocol, kind);
        self.protocol.method.push(Technique::new(kind, name));
        let index = self.protocol.method.len() - 1;
        self.buffer = Some(self.protocol.method[index].clone());
        self.cursor = Some(index);
        self.transition(EditorState::Editing(index));
        index
    }

    /// Remove the selected step and select its clamped neighbour
    ///
    /// The only remaining step cannot be removed.
    pub fn remove_step(&mut self) -> ComposerResult<Technique> {
        let index = self.selected()?;
        if self.protocol.method.len() <= 1 {
            warn!("Refusing to remove the last step of {:?}", self.protocol.name);
            return Err(ComposerError::LastStep);
        }
        let removed = self.protocol.method.remove(index);
        let next = index.min(self.protocol.method.len() - 1);
        self.buffer = Some(self.protocol.method[next].clone());
        self.cursor = Some(next);
        self.transition(EditorState::Editing(next));
        Ok(removed)
    }

    /// Swap step `index` with the one before it; no-op at the top
    pub fn move_up(&mut self, index: usize) -> ComposerResult<()> {
        self.check_index(index)?;
        if index == 0 {
            return Ok(());
        }
        self.swap(index - 1, index);
        Ok(())
    }

    /// Swap step `index` with the one after it; no-op at the bottom
    pub fn move_down(&mut self, index: usize) -> ComposerResult<()> {
        self.check_index(index)?;
        if index + 1 == self.protocol.method.len() {
            return Ok(());
        }
        self.swap(index, index + 1);
        Ok(())
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.protocol.method.swap(a, b);
        // Selection follows the moved step
        let Some(i) = self.cursor else {
            return;
        };
        let moved = if i == a {
            b
        } else if i == b {
            a
        } else {
            i
        };
        self.cursor = Some(moved);
        let state = match self.state() {
            EditorState::Editing(_) => EditorState::Editing(moved),
            EditorState::DirtyStep(_) => EditorState::DirtyStep(moved),
            other => other,
        };
        self.transition(state);
    }

    pub fn set_name(&mut self, name: &str) {
        self.protocol.name = name.to_string();
        self.transition(EditorState::DirtyName);
    }

    fn check_name(&self) -> ComposerResult<()> {
        if is_valid_protocol_name(&self.protocol.name) {
            Ok(())
        } else {
            Err(ComposerError::NameInvalid(self.protocol.name.clone()))
        }
    }

    /// Apply pending step edits before the draft leaves the editor
    fn flush(&mut self) {
        if !self.has_pending_step() {
            return;
        }
        if let (Some(index), Some(buffer)) = (self.cursor, self.buffer.clone()) {
            debug!(step = index, "flushing pending step edit");
            self.protocol.method[index] = buffer;
        }
    }

    fn close(&mut self) {
        self.buffer = None;
        self.cursor = None;
        self.transition(EditorState::Idle);
    }

    /// Add the draft to the inventory as a new protocol
    pub fn save_protocol(&mut self, inventory: &mut ProtocolInventory, opts: WriteOptions) -> ComposerResult<()> {
        self.check_name()?;
        if inventory.contains(&self.protocol.name) {
            return Err(ComposerError::NameExists(self.protocol.name.clone()));
        }
        self.flush();
        inventory.add(self.protocol.clone(), opts)?;
        info!("Saved new protocol {:?}", self.protocol.name);
        self.close();
        Ok(())
    }

    /// Replace the inventory protocol of the same name with the draft
    pub fn replace_protocol(&mut self, inventory: &mut ProtocolInventory, opts: WriteOptions) -> ComposerResult<()> {
        self.check_name()?;
        self.flush();
        inventory.update(self.protocol.clone(), opts)?;
        info!("Updated protocol {:?}", self.protocol.name);
        self.close();
        Ok(())
    }
}
