//! Ordered route-event union of dissolved tables.
//!
//! Feature classes are folded left in ascending mean overlay order. Each
//! union splits both inputs at every measure breakpoint on a route and emits
//! one row per covered segment, carrying attributes from both sides.
use super::index::FeatureClassPlan;
use super::{conversion, ControlFields, OverlayError};
use crate::table::{Field, FieldType, Table, TableError, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Processing order for `plans`: ascending mean overlay order, ties kept in
/// index-table order.
pub fn overlay_order(plans: &[FeatureClassPlan]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..plans.len()).collect();
    order.sort_by(|a, b| plans[*a].overlay_order.total_cmp(&plans[*b].overlay_order));
    order
}

/// One pairwise union performed by [`merge_ordered`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeStep {
    pub step: usize,
    pub left: String,
    pub right: String,
    pub output: String,
    pub rows: usize,
}

struct Event {
    from: f64,
    to: f64,
    row: usize,
}

fn events_by_route(
    table: &Table,
    fields: &ControlFields,
) -> Result<BTreeMap<Value, Vec<Event>>, TableError> {
    let route_index = table.require_field(&fields.route_id)?;
    let from_index = table.require_field(&fields.from_measure)?;
    let to_index = table.require_field(&fields.to_measure)?;
    let mut routes: BTreeMap<Value, Vec<Event>> = BTreeMap::new();
    for (row_index, row) in table.rows.iter().enumerate() {
        let (Some(from), Some(to)) = (row[from_index].as_f64(), row[to_index].as_f64()) else {
            continue;
        };
        routes.entry(row[route_index].clone()).or_default().push(Event {
            from,
            to,
            row: row_index,
        });
    }
    for events in routes.values_mut() {
        events.sort_by(|a, b| a.from.total_cmp(&b.from).then_with(|| a.row.cmp(&b.row)));
    }
    Ok(routes)
}

/// Rows of `events` (sorted by start) that cover each segment.
///
/// Segments come from the sorted breakpoints of every event on the route, so
/// an event active at a segment's start always reaches its end.
fn coverage(events: &[Event], segments: &[(f64, f64)]) -> Vec<Vec<usize>> {
    let mut next = 0;
    let mut active: Vec<&Event> = Vec::new();
    let mut covered = Vec::with_capacity(segments.len());
    for (start, end) in segments {
        while next < events.len() && events[next].from <= *start {
            active.push(&events[next]);
            next += 1;
        }
        active.retain(|event| event.to > *start);
        covered.push(
            active
                .iter()
                .filter(|event| event.to >= *end)
                .map(|event| event.row)
                .collect(),
        );
    }
    covered
}

fn attribute_columns(table: &Table, fields: &ControlFields) -> Vec<usize> {
    (0..table.fields.len())
        .filter(|index| {
            let field = &table.fields[*index];
            !fields
                .measure_and_route()
                .iter()
                .any(|control| field.is_named(control))
        })
        .collect()
}

/// Route-event union of `left` and `right`.
///
/// Output schema: route id, left attributes, right attributes, from-measure,
/// to-measure. Segments covered by only one side get nulls for the other.
pub fn union_events(
    left: &Table,
    right: &Table,
    fields: &ControlFields,
    name: &str,
) -> Result<Table, TableError> {
    let left_columns = attribute_columns(left, fields);
    let right_columns = attribute_columns(right, fields);
    let route_field = left.fields[left.require_field(&fields.route_id)?].clone();

    let mut out_fields = vec![route_field];
    for index in &left_columns {
        out_fields.push(left.fields[*index].clone());
    }
    for index in &right_columns {
        let field = &right.fields[*index];
        if out_fields.iter().any(|existing| existing.is_named(&field.name)) {
            return Err(TableError::DuplicateField {
                table: name.to_string(),
                field: field.name.clone(),
            });
        }
        out_fields.push(field.clone());
    }
    out_fields.push(Field::new(fields.from_measure.clone(), FieldType::Double));
    out_fields.push(Field::new(fields.to_measure.clone(), FieldType::Double));
    let mut output = Table::new(name, out_fields);

    let mut left_routes = events_by_route(left, fields)?;
    let mut right_routes = events_by_route(right, fields)?;
    let mut route_ids: Vec<Value> = left_routes.keys().cloned().collect();
    route_ids.extend(right_routes.keys().cloned());
    route_ids.sort();
    route_ids.dedup();

    for route in route_ids {
        let left_events = left_routes.remove(&route).unwrap_or_default();
        let right_events = right_routes.remove(&route).unwrap_or_default();

        let mut breakpoints: Vec<f64> = left_events
            .iter()
            .chain(&right_events)
            .flat_map(|event| [event.from, event.to])
            .collect();
        breakpoints.sort_by(f64::total_cmp);
        breakpoints.dedup();
        let segments: Vec<(f64, f64)> = breakpoints
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();

        let left_cover = coverage(&left_events, &segments);
        let right_cover = coverage(&right_events, &segments);
        for (index, (start, end)) in segments.iter().enumerate() {
            if left_cover[index].is_empty() && right_cover[index].is_empty() {
                continue;
            }
            let lefts = side_rows(&left_cover[index]);
            let rights = side_rows(&right_cover[index]);
            for left_row in &lefts {
                for right_row in &rights {
                    let mut row = Vec::with_capacity(output.fields.len());
                    row.push(route.clone());
                    push_attributes(&mut row, left, &left_columns, *left_row);
                    push_attributes(&mut row, right, &right_columns, *right_row);
                    row.push(Value::Double(*start));
                    row.push(Value::Double(*end));
                    output.push_row(row)?;
                }
            }
        }
    }
    Ok(output)
}

fn side_rows(covered: &[usize]) -> Vec<Option<usize>> {
    if covered.is_empty() {
        vec![None]
    } else {
        covered.iter().copied().map(Some).collect()
    }
}

fn push_attributes(row: &mut Vec<Value>, table: &Table, columns: &[usize], source: Option<usize>) {
    for column in columns {
        let value = source.map_or(Value::Null, |index| table.rows[index][*column].clone());
        row.push(value);
    }
}

/// Fold `tables` (already in overlay order) into one accumulator.
///
/// `on_step` sees every intermediate accumulator, which the pipeline uses to
/// persist it to the staging workspace. Returns `None` for empty input.
pub fn merge_ordered<F>(
    tables: Vec<Table>,
    fields: &ControlFields,
    mut on_step: F,
) -> Result<(Option<Table>, Vec<MergeStep>), OverlayError>
where
    F: FnMut(&Table) -> Result<(), OverlayError>,
{
    let mut tables = tables.into_iter();
    let Some(mut accumulator) = tables.next() else {
        return Ok((None, Vec::new()));
    };
    let mut steps = Vec::new();
    for (position, table) in tables.enumerate() {
        let step = position + 1;
        let name = format!("OVERLAY_{step}");
        let merged = union_events(&accumulator, &table, fields, &name).map_err(|err| {
            conversion(format!("union {} with {}", accumulator.name, table.name), err)
        })?;
        tracing::info!(
            step,
            left = %accumulator.name,
            right = %table.name,
            rows = merged.len(),
            "overlay union"
        );
        steps.push(MergeStep {
            step,
            left: accumulator.name.clone(),
            right: table.name.clone(),
            output: name,
            rows: merged.len(),
        });
        on_step(&merged)?;
        accumulator = merged;
    }
    Ok((Some(accumulator), steps))
}
