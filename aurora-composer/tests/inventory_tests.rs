//! Inventory persistence, groups, working copies and facets

mod helpers;

use aurora_composer::inventory::table::{BATCH_COLUMN, GROUPS_COLUMN, SUBBATCH_COLUMN};
use aurora_composer::inventory::{Cell, Inventory, WorkingCopy};
use aurora_composer::models::ALL_SAMPLES;
use aurora_composer::query::{compute_facet, Predicate, Projection};
use aurora_composer::storage::encoding::{decode_blob, encode_blob};
use aurora_composer::{ComposerError, WriteOptions};
use helpers::*;
use serde_json::{json, Value};
use std::fs;

#[test]
fn test_json_inventory_survives_reload() {
    let files = json_inventories();
    {
        let mut samples = files.open_samples();
        samples
            .add_many(vec![sample_in_groups(1, &["trial1"]), sample(2)], WriteOptions::default())
            .unwrap();
        let mut protocols = files.open_protocols();
        protocols.add(protocol("Formation"), WriteOptions::default()).unwrap();
    }

    let samples = files.open_samples();
    assert_eq!(samples.ids(), vec![1, 2]);
    assert_eq!(samples.get(1), Some(&sample_in_groups(1, &["trial1"])));

    let protocols = files.open_protocols();
    assert_eq!(protocols.get("Formation"), Some(&protocol("Formation")));
}

#[test]
fn test_stored_document_uses_tagged_values() {
    let files = json_inventories();
    let mut samples = files.open_samples();
    samples.add(sample(4), WriteOptions::default()).unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&files.samples_path).unwrap()).unwrap();
    let record = &raw[0];
    assert_eq!(record["id"], json!(4));
    assert_eq!(record["metadata"]["groups"], json!({"set": ["all-samples"]}));
    assert_eq!(
        record["metadata"]["creation_datetime"],
        json!({"datetime": "2023-01-01 09:04:00"})
    );
}

#[test]
fn test_legacy_and_unknown_fields_are_kept() {
    let files = json_inventories();
    let mut legacy = serde_json::to_value(sample(8)).unwrap();
    let map = legacy.as_object_mut().unwrap();
    map.remove("id");
    map.insert("battery_id".to_string(), json!(8));
    map.insert("scan".to_string(), encode_blob(b"\x00\x01raw"));
    fs::write(&files.samples_path, serde_json::to_string(&json!([legacy])).unwrap()).unwrap();

    let samples = files.open_samples();
    let loaded = samples.get(8).expect("legacy id is read");
    assert_eq!(decode_blob(&loaded.extra["scan"]), Some(b"\x00\x01raw".to_vec()));

    assert!(samples.save());
    let raw: Value = serde_json::from_str(&fs::read_to_string(&files.samples_path).unwrap()).unwrap();
    assert_eq!(raw[0]["id"], json!(8));
    assert!(raw[0].get("battery_id").is_none());
    assert_eq!(raw[0]["scan"], encode_blob(b"\x00\x01raw"));
}

#[test]
fn test_invalid_and_duplicate_records_are_dropped_on_load() {
    let files = json_inventories();
    let good = serde_json::to_value(sample(1)).unwrap();
    let mut renamed = serde_json::to_value(sample(1)).unwrap();
    renamed["metadata"]["name"] = json!("230101-99");
    fs::write(
        &files.samples_path,
        serde_json::to_string(&json!([good, {"id": 2, "metadata": {}}, renamed])).unwrap(),
    )
    .unwrap();

    let samples = files.open_samples();
    assert_eq!(samples.ids(), vec![1]);
    assert_eq!(samples.get(1).unwrap().metadata.name, "230101-1");
}

#[test]
fn test_corrupt_document_reads_as_empty() {
    let files = json_inventories();
    fs::write(&files.samples_path, "{ not json").unwrap();

    let samples = files.open_samples();
    assert!(samples.is_empty());
}

#[test]
fn test_add_many_is_all_or_nothing() {
    let mut samples = memory_samples(vec![sample(2)]);

    let result = samples.add_many(vec![sample(3), sample(2)], WriteOptions::default());

    assert!(matches!(result, Err(ComposerError::DuplicateId(2))));
    assert_eq!(samples.ids(), vec![2]);
}

#[test]
fn test_ambient_group_added_on_insert() {
    let mut bare = sample(6);
    bare.metadata.groups.clear();
    let samples = memory_samples(vec![bare]);

    assert!(samples.get(6).unwrap().in_group(ALL_SAMPLES));
    assert_eq!(samples.get_group_samples(ALL_SAMPLES), vec![6]);
}

#[test]
fn test_save_group_sets_exact_membership() {
    let mut samples = memory_samples(vec![
        sample_in_groups(1, &["g"]),
        sample_in_groups(2, &["g"]),
        sample(3),
    ]);

    samples.save_group(&[2, 3], "g", WriteOptions::unsaved()).unwrap();
    assert_eq!(samples.get_group_samples("g"), vec![2, 3]);
    assert!(samples.get(1).unwrap().in_group(ALL_SAMPLES));

    samples.save_group(&[], "g", WriteOptions::unsaved()).unwrap();
    assert!(samples.get_group_samples("g").is_empty());
    assert!(!samples.get_group_labels().contains("g"));

    samples.save_group(&[1], ALL_SAMPLES, WriteOptions::unsaved()).unwrap();
    assert_eq!(samples.get_group_samples(ALL_SAMPLES), vec![1, 2, 3]);
}

#[test]
fn test_group_reads_follow_the_cache() {
    let mut samples = memory_samples(vec![sample(1), sample(2)]);

    samples.save_group(&[1, 2], "g", WriteOptions::deferred()).unwrap();
    assert!(samples.get(1).unwrap().in_group("g"));
    assert!(samples.get_group_samples("g").is_empty());
    assert!(!samples.get_group_labels().contains("g"));

    samples.cache();
    assert_eq!(samples.get_group_samples("g"), vec![1, 2]);
    assert!(samples.get_group_labels().contains("g"));
}

#[test]
fn test_group_edits_refused_for_unknown_ids() {
    let mut samples = memory_samples(vec![sample(1)]);

    let result = samples.save_group(&[1, 42], "g", WriteOptions::unsaved());

    assert!(matches!(result, Err(ComposerError::NotFound(_))));
    assert!(samples.get_group_samples("g").is_empty());
}

#[test]
fn test_subbatch_assignment_updates_table() {
    let mut samples = memory_samples(vec![sample(1), sample(2)]);

    samples.assign_subbatch(&[2], "A", WriteOptions::unsaved()).unwrap();

    let table = samples.query(
        &Predicate::new().with_equals(SUBBATCH_COLUMN, "A"),
        Some(&Projection::from("id")),
    );
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].get("id"), &Cell::from(2u32));
}

#[test]
fn test_working_copy_dirty_commit_and_reset() {
    let files = json_inventories();
    let mut master = files.open_samples();
    master.add(sample(1), WriteOptions::default()).unwrap();

    let mut copy = WorkingCopy::new(&master);
    assert!(!*copy.dirty().get());

    copy.edit(&master, |w| w.add(sample(2), WriteOptions::default()).unwrap());
    assert!(*copy.dirty().get());
    assert_eq!(files.open_samples().ids(), vec![1], "working copy never writes the master file");

    copy.reset(&master);
    assert!(!*copy.dirty().get());
    assert_eq!(copy.working().ids(), vec![1]);

    copy.edit(&master, |w| w.add(sample(3), WriteOptions::default()).unwrap());
    assert!(copy.commit(&mut master));
    assert!(!*copy.dirty().get());
    assert_eq!(master.ids(), vec![1, 3]);
    assert_eq!(files.open_samples().ids(), vec![1, 3]);
}

#[test]
fn test_protocol_working_copy_roundtrip() {
    let mut master = memory_protocols(vec![protocol("A")]);
    let mut copy = WorkingCopy::new(&master);

    copy.edit(&master, |w| w.delete("A", WriteOptions::default()).unwrap());
    assert!(*copy.dirty().get());

    copy.commit(&mut master);
    assert!(master.is_empty());
    assert_eq!(master, master.copy());
}

#[test]
fn test_protocol_query_follows_requested_order() {
    let protocols = memory_protocols(vec![protocol("A"), protocol("B"), protocol("C")]);
    let order = vec!["C".to_string(), "missing".to_string(), "A".to_string()];

    let picked: Vec<String> = protocols
        .query(Some(order.as_slice()))
        .into_iter()
        .map(|p| p.name)
        .collect();

    assert_eq!(picked, vec!["C", "A"]);
    assert_eq!(protocols.query(None).len(), 3);
}

#[test]
fn test_duplicate_protocol_name_refused() {
    let mut protocols = memory_protocols(vec![protocol("A")]);

    let result = protocols.add(protocol("A"), WriteOptions::default());

    assert!(matches!(result, Err(ComposerError::DuplicateName(n)) if n == "A"));
    assert_eq!(protocols.len(), 1);
}

#[test]
fn test_facet_counts_sum_to_filtered_rows() {
    let mut samples = memory_samples((1..=6).map(sample).collect());
    samples.assign_subbatch(&[1, 2, 3], "A", WriteOptions::unsaved()).unwrap();
    samples.assign_subbatch(&[4], "B", WriteOptions::unsaved()).unwrap();

    let predicate = Predicate::new().with_equals("specs.case", "CR2032");
    let options = compute_facet(samples.table(), &predicate, SUBBATCH_COLUMN);

    let values: Vec<String> = options.iter().map(|o| o.value.to_string()).collect();
    assert_eq!(values, vec!["0", "A", "B"]);
    let total: usize = options.iter().map(|o| o.count).sum();
    assert_eq!(total, samples.query(&predicate, None).len());
}

#[test]
fn test_facet_ignores_own_field_and_keeps_zero_counts() {
    let mut samples = memory_samples((1..=4).map(sample).collect());
    samples.assign_subbatch(&[1, 2], "A", WriteOptions::unsaved()).unwrap();
    let mut other = sample(5);
    other.metadata.batch = "230102".to_string();
    other.metadata.name = "230102-5".to_string();
    samples.add(other, WriteOptions::unsaved()).unwrap();

    let predicate = Predicate::new()
        .with_equals(SUBBATCH_COLUMN, "A")
        .with_equals(BATCH_COLUMN, "230101");

    let subbatches = compute_facet(samples.table(), &predicate, SUBBATCH_COLUMN);
    let counts: Vec<(String, usize)> = subbatches
        .iter()
        .map(|o| (o.value.to_string(), o.count))
        .collect();
    assert_eq!(counts, vec![("0".to_string(), 2), ("A".to_string(), 2)]);

    let batches = compute_facet(samples.table(), &predicate, BATCH_COLUMN);
    let counts: Vec<(String, usize)> = batches
        .iter()
        .map(|o| (o.value.to_string(), o.count))
        .collect();
    assert_eq!(counts, vec![("230101".to_string(), 2), ("230102".to_string(), 0)]);
}

#[test]
fn test_group_facet_counts_members() {
    let samples = memory_samples(vec![
        sample_in_groups(1, &["g1"]),
        sample_in_groups(2, &["g1", "g2"]),
        sample(3),
    ]);

    let options = compute_facet(samples.table(), &Predicate::new(), GROUPS_COLUMN);
    let counts: Vec<(String, usize)> = options
        .iter()
        .map(|o| (o.value.to_string(), o.count))
        .collect();

    assert_eq!(
        counts,
        vec![
            ("all-samples".to_string(), 3),
            ("g1".to_string(), 2),
            ("g2".to_string(), 1)
        ]
    );
}

#[test]
fn test_date_range_filter_includes_whole_end_day() {
    let samples = memory_samples((1..=3).map(sample).collect());

    let predicate =
        Predicate::from_json(&json!({"from": "2023-01-01", "to": "2023-01-01", "metadata.batch": ""}))
            .unwrap();

    assert_eq!(samples.query(&predicate, None).len(), 3);

    let later = Predicate::from_json(&json!({"from": "2023-01-02"})).unwrap();
    assert!(samples.query(&later, None).is_empty());
}
