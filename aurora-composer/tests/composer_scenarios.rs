//! End-to-end composer scenarios
//!
//! Selection through the validity gate, submission fan-out and robot import,
//! driven the way a front-end would drive them.

mod helpers;

use aurora_common::events::{AuroraEvent, EventBus, SelectionField};
use aurora_composer::editor::ProtocolEditor;
use aurora_composer::import::import_batch;
use aurora_composer::models::TechniqueKind;
use aurora_composer::submission::{GroupMember, InMemoryEngine};
use aurora_composer::{Composer, ComposerError, WriteOptions};
use helpers::*;

const CODE: &str = "tomato@localhost";

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_empty_selection_is_not_submittable() {
    let mut composer = Composer::new(EventBus::new(16), CODE);

    let verdict = composer.signal_preview();

    assert!(!*composer.selection().valid_input().get());
    assert_eq!(verdict.reason(), Some("No battery samples selected!"));
    assert_eq!(verdict.notice(), "❌ No battery samples selected!");
}

#[test]
fn test_missing_settings_blocks_preview() {
    let mut composer = Composer::new(EventBus::new(16), CODE);
    composer.select_samples(&[1]);
    composer.select_protocols(&names(&["A", "B"]));
    composer.save_settings("A", settings()).unwrap();

    let verdict = composer.signal_preview();

    assert!(!*composer.selection().valid_input().get());
    assert_eq!(verdict.reason(), Some("No protocol settings selected!"));
}

#[test]
fn test_happy_submission_produces_one_workflow() {
    let samples = memory_samples(vec![sample_in_groups(5, &["trial1"])]);
    let protocols = memory_protocols(vec![protocol("OCV_then_CC")]);
    let mut composer = Composer::new(EventBus::new(16), CODE);
    let mut engine = InMemoryEngine::new();

    composer.select_samples(&[5]);
    composer.select_protocols(&names(&["OCV_then_CC"]));
    composer.save_settings("OCV_then_CC", settings()).unwrap();
    assert!(composer.signal_preview().is_valid());

    let report = composer
        .submit(&mut engine, &samples, &protocols, false, "G")
        .unwrap();

    assert_eq!(report.handles().len(), 1);
    assert!(report.is_complete());

    let (handle, bundle) = &engine.submissions()[0];
    assert_eq!(*handle, report.submitted[0].handle);
    assert!(!bundle.control_settings["OCV_then_CC"].unlock_when_done);
    assert_eq!(bundle.protocols["OCV_then_CC"].method.len(), 2);

    let node = GroupMember::Sample(bundle.battery_sample.uuid);
    assert!(engine.group("all-samples").contains(&node));
    assert!(engine.group("trial1").contains(&node));
    assert!(engine.group("G/workflows").contains(&GroupMember::Workflow(*handle)));
    assert_eq!(engine.label_of(handle), Some("Experiment run on 230101-5"));
    assert!(!*composer.submitting().get());
}

#[test]
fn test_fan_out_survives_one_failure() {
    let samples = memory_samples(vec![sample(5), sample(7), sample(9)]);
    let protocols = memory_protocols(vec![protocol("P")]);
    let mut composer = Composer::new(EventBus::new(16), CODE);
    let mut engine = FailingEngine::new(&[7]);

    composer.select_samples(&[5, 7, 9]);
    composer.select_protocols(&names(&["P"]));
    composer.save_settings("P", settings()).unwrap();
    composer.signal_preview();

    let report = composer
        .submit(&mut engine, &samples, &protocols, true, "G")
        .unwrap();

    let submitted: Vec<u32> = report.submitted.iter().map(|s| s.sample_id).collect();
    assert_eq!(submitted, vec![5, 9]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].sample_id, 7);
    assert!(!report.is_complete());
    assert_eq!(engine.inner.submissions().len(), 2);
}

#[test]
fn test_editor_keeps_at_least_one_step() {
    let mut editor = ProtocolEditor::blank();
    editor.select(0).unwrap();

    assert!(matches!(editor.remove_step(), Err(ComposerError::LastStep)));
    assert_eq!(editor.protocol().method.len(), 1);

    editor.add_step(TechniqueKind::ConstantCurrent);
    assert_eq!(editor.protocol().method.len(), 2);

    editor.select(0).unwrap();
    editor.remove_step().unwrap();
    assert_eq!(editor.protocol().method.len(), 1);
    assert_eq!(editor.state().selected(), Some(0));
}

#[test]
fn test_robot_import_numbers_after_highest_id() {
    let mut earlier = sample(10);
    earlier.metadata.batch = "221231".to_string();
    earlier.metadata.name = "221231-10".to_string();
    let mut samples = memory_samples(vec![earlier]);
    let csv = robot_csv(&[1, 2, 3]);

    let ids = import_batch(&mut samples, &csv, "230101", WriteOptions::default(), None).unwrap();

    assert_eq!(ids, vec![11, 12, 13]);
    let names: Vec<&str> = ids
        .iter()
        .map(|id| samples.get(*id).unwrap().metadata.name.as_str())
        .collect();
    assert_eq!(names, vec!["230101-1", "230101-2", "230101-3"]);

    let again = import_batch(&mut samples, &csv, "230101", WriteOptions::default(), None);
    assert!(matches!(again, Err(ComposerError::BatchExists(b)) if b == "230101"));
    assert_eq!(samples.len(), 4);
}

#[test]
fn test_submit_refused_without_valid_preview() {
    let samples = memory_samples(vec![sample(1)]);
    let protocols = memory_protocols(vec![protocol("P")]);
    let mut composer = Composer::new(EventBus::new(16), CODE);
    let mut engine = InMemoryEngine::new();

    composer.select_samples(&[1]);
    composer.select_protocols(&names(&["P"]));

    let refused = composer.submit(&mut engine, &samples, &protocols, false, "G");
    assert!(matches!(refused, Err(ComposerError::SubmissionRefused(_))));
    assert!(engine.submissions().is_empty());
}

#[test]
fn test_unknown_code_refuses_whole_batch() {
    let samples = memory_samples(vec![sample(1), sample(2)]);
    let protocols = memory_protocols(vec![protocol("P")]);
    let mut composer = Composer::new(EventBus::new(16), "missing@nowhere");
    let mut engine = InMemoryEngine::with_codes(["tomato@localhost"]);

    composer.select_samples(&[1, 2]);
    composer.select_protocols(&names(&["P"]));
    composer.save_settings("P", settings()).unwrap();
    composer.signal_preview();

    let refused = composer.submit(&mut engine, &samples, &protocols, false, "G");
    assert!(matches!(refused, Err(ComposerError::SubmissionRefused(_))));
    assert!(engine.submissions().is_empty());
    assert!(!*composer.submitting().get());
}

#[test]
fn test_composer_publishes_events() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let samples = memory_samples(vec![sample(3)]);
    let protocols = memory_protocols(vec![protocol("P")]);
    let mut composer = Composer::new(bus.clone(), CODE);
    let mut engine = InMemoryEngine::new();

    composer.select_samples(&[3]);
    composer.select_protocols(&names(&["P"]));
    composer.save_settings("P", settings()).unwrap();
    composer.signal_preview();
    composer
        .submit(&mut engine, &samples, &protocols, false, "G")
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let fields: Vec<SelectionField> = events
        .iter()
        .filter_map(|e| match e {
            AuroraEvent::SelectionChanged { field, .. } => Some(*field),
            _ => None,
        })
        .collect();
    assert_eq!(
        fields,
        vec![
            SelectionField::Samples,
            SelectionField::Protocols,
            SelectionField::Settings
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, AuroraEvent::PreviewGenerated { valid: true, reason: None, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, AuroraEvent::ExperimentSubmitted { sample_id: 3, .. })));
}
