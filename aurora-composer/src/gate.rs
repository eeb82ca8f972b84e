//! Validity gate and preview
//!
//! A selection is submittable when it has samples, has protocols, and has
//! settings for every selected protocol. The checks run in that order and
//! the first failure gives the notice.

use crate::inventory::{ProtocolInventory, SampleInventory};
use crate::models::{Protocol, Sample, Settings};
use crate::selection::Selection;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateFailure {
    NoSamples,
    NoProtocols,
    /// First selected protocol without settings
    MissingSettings(String),
}

impl GateFailure {
    pub fn message(&self) -> &'static str {
        match self {
            GateFailure::NoSamples => "No battery samples selected!",
            GateFailure::NoProtocols => "No protocols selected!",
            GateFailure::MissingSettings(_) => "No protocol settings selected!",
        }
    }
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub failure: Option<GateFailure>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.failure.as_ref().map(GateFailure::message)
    }

    /// Short notice for the area next to the submit button
    pub fn notice(&self) -> String {
        match &self.failure {
            None => "✅".to_string(),
            Some(failure) => format!("❌ {}", failure),
        }
    }
}

pub fn check(
    samples: &BTreeSet<u32>,
    protocols: &[String],
    settings: &BTreeMap<String, Settings>,
) -> Verdict {
    let failure = if samples.is_empty() {
        Some(GateFailure::NoSamples)
    } else if protocols.is_empty() {
        Some(GateFailure::NoProtocols)
    } else {
        protocols
            .iter()
            .find(|p| !settings.contains_key(*p))
            .map(|p| GateFailure::MissingSettings(p.clone()))
    };
    Verdict { failure }
}

pub fn is_valid(
    samples: &BTreeSet<u32>,
    protocols: &[String],
    settings: &BTreeMap<String, Settings>,
) -> bool {
    check(samples, protocols, settings).is_valid()
}

/// Read-only snapshot of a selection, resolved against the inventories
#[derive(Debug, Clone)]
pub struct Preview {
    pub verdict: Verdict,
    pub samples: Vec<Sample>,
    pub protocols: Vec<Protocol>,
    pub settings: BTreeMap<String, Settings>,
}

impl Preview {
    pub fn materialize(
        selection: &Selection,
        samples: &SampleInventory,
        protocols: &ProtocolInventory,
    ) -> Self {
        Self {
            verdict: selection.verdict(),
            samples: selection.get_samples(samples),
            protocols: selection.get_protocols(protocols),
            settings: selection.settings().get().clone(),
        }
    }

    /// Plain-text summary, one line per entry
    pub fn render(&self) -> String {
        let mut lines = vec![self.verdict.notice(), format!("Samples ({}):", self.samples.len())];
        lines.extend(self.samples.iter().map(|s| {
            format!(
                "  {:>5}  {:<16}  {} {}",
                s.id, s.metadata.name, s.specs.capacity.nominal, s.specs.capacity.units
            )
        }));

        lines.push(format!("Protocols ({}):", self.protocols.len()));
        for (i, p) in self.protocols.iter().enumerate() {
            lines.push(format!("  {}. {} ({} techniques)", i + 1, p.name, p.method.len()));
            lines.push(match self.settings.get(&p.name) {
                Some(settings) => settings_line(settings),
                None => "     no settings".to_string(),
            });
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn settings_line(settings: &Settings) -> String {
    let control = &settings.settings;
    let snapshot = match &control.snapshot {
        Some(s) => format!("every {} s as {:?}", s.frequency, s.prefix),
        None => "none".to_string(),
    };
    let monitors: Vec<&str> = settings.monitors.keys().map(String::as_str).collect();
    format!(
        "     verbosity {}, snapshot {}, monitors [{}]",
        control.verbosity,
        snapshot,
        monitors.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_for(names: &[&str]) -> BTreeMap<String, Settings> {
        names.iter().map(|n| (n.to_string(), Settings::default())).collect()
    }

    #[test]
    fn test_checks_run_in_order() {
        let none = BTreeSet::new();
        let one: BTreeSet<u32> = [1].into_iter().collect();
        let ab = vec!["A".to_string(), "B".to_string()];

        let v = check(&none, &[], &BTreeMap::new());
        assert_eq!(v.reason(), Some("No battery samples selected!"));

        let v = check(&one, &[], &BTreeMap::new());
        assert_eq!(v.reason(), Some("No protocols selected!"));

        let v = check(&one, &ab, &settings_for(&["A"]));
        assert_eq!(v.failure, Some(GateFailure::MissingSettings("B".into())));
        assert_eq!(v.reason(), Some("No protocol settings selected!"));

        let v = check(&one, &ab, &settings_for(&["A", "B"]));
        assert!(v.is_valid());
        assert_eq!(v.notice(), "✅");
    }

    #[test]
    fn test_notice_carries_reason() {
        let v = check(&BTreeSet::new(), &[], &BTreeMap::new());
        assert_eq!(v.notice(), "❌ No battery samples selected!");
    }

    #[test]
    fn test_render_lists_protocols_with_settings() {
        let mut settings = settings_for(&["A"]);
        if let Some(a) = settings.get_mut("A") {
            a.monitors.insert("capacity".to_string(), Default::default());
        }
        let preview = Preview {
            verdict: check(&BTreeSet::new(), &[], &settings),
            samples: Vec::new(),
            protocols: vec![Protocol::new("A", Vec::new()), Protocol::new("B", Vec::new())],
            settings,
        };

        let text = preview.render();
        let lines: Vec<&str> = text.lines().collect();

        assert!(text.ends_with('\n'));
        assert_eq!(lines[0], "❌ No battery samples selected!");
        assert_eq!(lines[1], "Samples (0):");
        assert_eq!(lines[2], "Protocols (2):");
        assert_eq!(lines[3], "  1. A (0 techniques)");
        assert!(lines[4].contains("snapshot none, monitors [capacity]"), "{}", lines[4]);
        assert_eq!(lines[5], "  2. B (0 techniques)");
        assert_eq!(lines[6], "     no settings");
        assert_eq!(lines.len(), 7);
    }
}
