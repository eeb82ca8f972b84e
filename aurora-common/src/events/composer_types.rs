//! Supporting types for composer events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which inventory an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryKind {
    Samples,
    Protocols,
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryKind::Samples => write!(f, "Samples"),
            InventoryKind::Protocols => write!(f, "Protocols"),
        }
    }
}

/// Which part of the composer selection changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionField {
    Samples,
    Protocols,
    Settings,
    /// All three fields were cleared together
    Reset,
}

impl fmt::Display for SelectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionField::Samples => write!(f, "Samples"),
            SelectionField::Protocols => write!(f, "Protocols"),
            SelectionField::Settings => write!(f, "Settings"),
            SelectionField::Reset => write!(f, "Reset"),
        }
    }
}
