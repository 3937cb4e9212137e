//! Route-event dissolve.
//!
//! Rows sharing a route id and identical dissolve-field values are merged;
//! overlapping or touching measure ranges collapse into a single event.
use super::ControlFields;
use crate::table::{Field, FieldType, Table, TableError, Value};
use std::collections::HashMap;

struct Group {
    key: Vec<Value>,
    intervals: Vec<(f64, f64)>,
}

/// Dissolve `events` on `dissolve_fields`.
///
/// The output schema is route id, the dissolve fields in the given order,
/// then from-measure and to-measure. Rows without numeric measures are
/// dropped.
pub fn dissolve_events(
    events: &Table,
    name: &str,
    fields: &ControlFields,
    dissolve_fields: &[String],
) -> Result<Table, TableError> {
    let route_index = events.require_field(&fields.route_id)?;
    let from_index = events.require_field(&fields.from_measure)?;
    let to_index = events.require_field(&fields.to_measure)?;
    let key_indexes: Vec<usize> = std::iter::once(Ok(route_index))
        .chain(
            dissolve_fields
                .iter()
                .map(|field| events.require_field(field)),
        )
        .collect::<Result<_, _>>()?;

    let mut groups: Vec<Group> = Vec::new();
    let mut lookup: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut skipped = 0usize;
    for row in &events.rows {
        let (Some(from), Some(to)) = (row[from_index].as_f64(), row[to_index].as_f64()) else {
            skipped += 1;
            continue;
        };
        let key: Vec<Value> = key_indexes.iter().map(|index| row[*index].clone()).collect();
        let slot = *lookup.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key,
                intervals: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].intervals.push((from, to));
    }
    if skipped > 0 {
        tracing::warn!(table = %events.name, skipped, "dropped events without measures");
    }

    let mut out_fields = Vec::with_capacity(key_indexes.len() + 2);
    for index in &key_indexes {
        out_fields.push(events.fields[*index].clone());
    }
    out_fields.push(Field::new(fields.from_measure.clone(), FieldType::Double));
    out_fields.push(Field::new(fields.to_measure.clone(), FieldType::Double));

    let mut merged_rows: Vec<(Value, f64, usize, Vec<Value>)> = Vec::new();
    for (group_index, group) in groups.into_iter().enumerate() {
        for (from, to) in merge_intervals(group.intervals) {
            let mut row = group.key.clone();
            row.push(Value::Double(from));
            row.push(Value::Double(to));
            merged_rows.push((group.key[0].clone(), from, group_index, row));
        }
    }
    merged_rows.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.total_cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let mut dissolved = Table::new(name, out_fields);
    for (_, _, _, row) in merged_rows {
        dissolved.push_row(row)?;
    }
    tracing::debug!(
        table = %events.name,
        fields = %dissolve_fields.join(";"),
        input = events.len(),
        output = dissolved.len(),
        "dissolved events"
    );
    Ok(dissolved)
}

/// Sort by start and merge intervals that overlap or touch.
pub fn merge_intervals(mut intervals: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());
    for (from, to) in intervals {
        match merged.last_mut() {
            Some(last) if from <= last.1 => {
                if to > last.1 {
                    last.1 = to;
                }
            }
            _ => merged.push((from, to)),
        }
    }
    merged
}
