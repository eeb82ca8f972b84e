//! Filter facets with live counts
//!
//! For a field `F`, the options are every value `F` takes anywhere in the
//! table, each counted over the rows matching the current predicate with
//! the condition on `F` removed. Values filtered out elsewhere stay visible
//! with a count of zero.
//!
//! Set-valued columns (`metadata.groups`) are counted per member, so their
//! counts may add up to more than the row count. For every scalar column the
//! counts add up to the size of the filtered table.

use super::Predicate;
use crate::inventory::table::{Cell, Table};
use aurora_common::observable::Observable;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FacetOption {
    pub value: Cell,
    pub count: usize,
}

fn members(cell: &Cell) -> Vec<Cell> {
    match cell {
        Cell::Set(items) => items.iter().map(|s| Cell::Str(s.clone())).collect(),
        other => vec![other.clone()],
    }
}

/// Options for one field, sorted by value
pub fn compute_facet(table: &Table, predicate: &Predicate, field: &str) -> Vec<FacetOption> {
    let mut counts: BTreeMap<Cell, usize> = BTreeMap::new();
    for cell in table.column(field) {
        for value in members(cell) {
            counts.entry(value).or_insert(0);
        }
    }

    let filtered = predicate.without(field).compile().evaluate(table, None);
    for cell in filtered.column(field) {
        for value in members(cell) {
            *counts.entry(value).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .map(|(value, count)| FacetOption { value, count })
        .collect()
}

/// Options for several fields
pub fn compute_facets(
    table: &Table,
    predicate: &Predicate,
    fields: &[&str],
) -> BTreeMap<String, Vec<FacetOption>> {
    fields
        .iter()
        .map(|f| (f.to_string(), compute_facet(table, predicate, f)))
        .collect()
}

/// Observable facet options for a filter panel
///
/// A refresh rewrites every field's option list with notifications
/// suppressed, then bumps `refreshed` once.
pub struct FacetPanel {
    options: BTreeMap<String, Observable<Vec<FacetOption>>>,
    refreshed: Observable<u64>,
}

impl FacetPanel {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            options: fields
                .iter()
                .map(|f| (f.to_string(), Observable::new("facet_options", Vec::new())))
                .collect(),
            refreshed: Observable::new("facets_refreshed", 0),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    pub fn options(&self, field: &str) -> Option<&Observable<Vec<FacetOption>>> {
        self.options.get(field)
    }

    pub fn refreshed(&self) -> &Observable<u64> {
        &self.refreshed
    }

    pub fn refresh(&mut self, table: &Table, predicate: &Predicate) {
        for (field, observable) in self.options.iter_mut() {
            let computed = compute_facet(table, predicate, field);
            observable.silently(|o| {
                o.modify(Vec::clear);
                for option in computed {
                    o.modify(|v| v.push(option));
                }
            });
        }
        debug!(fields = self.options.len(), rows = table.len(), "facets refreshed");
        self.refreshed.modify(|n| *n += 1);
    }
}
