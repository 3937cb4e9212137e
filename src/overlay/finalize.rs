//! Final dissolve, length computation, sliver removal, and event location.
use super::dissolve::dissolve_events;
use super::events::round_measures;
use super::temporal::TemporalFilter;
use super::validate::LENGTH_FIELD;
use super::{conversion, ControlFields, OverlayError};
use crate::table::{Field, FieldType, Table, TableError, Value};
use std::collections::HashMap;

/// Rows at or below this length are overlay artifacts and are dropped.
pub const SLIVER_TOLERANCE: f64 = 0.001;

/// Location status field added to the output feature class.
pub const LOC_ERROR_FIELD: &str = "LOC_ERROR";

pub const LOC_NO_ERROR: &str = "NO ERROR";
pub const LOC_ROUTE_NOT_FOUND: &str = "ROUTE NOT FOUND";
pub const LOC_MEASURE_NOT_FOUND: &str = "ROUTE MEASURE NOT FOUND";
pub const LOC_PARTIAL_FROM: &str = "PARTIAL MATCH FOR THE FROM-MEASURE";
pub const LOC_PARTIAL_TO: &str = "PARTIAL MATCH FOR THE TO-MEASURE";
pub const LOC_PARTIAL_BOTH: &str = "PARTIAL MATCH FOR THE FROM-MEASURE AND TO-MEASURE";

/// Names and settings for the final formatting step.
#[derive(Debug, Clone)]
pub struct FinalizeOptions<'a> {
    pub table_name: &'a str,
    pub feature_class_name: &'a str,
    pub output_fields: &'a [String],
    pub decimal_places: u32,
}

#[derive(Debug)]
pub struct FinalOutput {
    pub table: Table,
    pub feature_class: Table,
    pub slivers_removed: usize,
}

/// Round, dissolve, measure, and de-sliver the accumulator.
pub fn format_output_table(
    mut accumulator: Table,
    fields: &ControlFields,
    options: &FinalizeOptions<'_>,
) -> Result<(Table, usize), OverlayError> {
    round_measures(&mut accumulator, &fields.measures(), options.decimal_places);
    let mut table = dissolve_events(
        &accumulator,
        options.table_name,
        fields,
        options.output_fields,
    )
    .map_err(|err| conversion("final dissolve", err))?;
    add_length(&mut table, fields).map_err(|err| conversion("calculate length", err))?;
    let slivers_removed =
        remove_slivers(&mut table).map_err(|err| conversion("remove slivers", err))?;
    if slivers_removed > 0 {
        tracing::info!(slivers_removed, "removed sliver segments");
    }
    Ok((table, slivers_removed))
}

/// Run the full final step, including location against the routes layer.
pub fn finalize(
    accumulator: Table,
    routes: &Table,
    temporal: &TemporalFilter,
    fields: &ControlFields,
    options: &FinalizeOptions<'_>,
) -> Result<FinalOutput, OverlayError> {
    let (table, slivers_removed) = format_output_table(accumulator, fields, options)?;
    let feature_class = locate_events(&table, routes, temporal, fields, options.feature_class_name)
        .map_err(|err| conversion("locate events", err))?;
    Ok(FinalOutput {
        table,
        feature_class,
        slivers_removed,
    })
}

/// Append `Length = to - from`.
pub fn add_length(table: &mut Table, fields: &ControlFields) -> Result<(), TableError> {
    let from_index = table.require_field(&fields.from_measure)?;
    let to_index = table.require_field(&fields.to_measure)?;
    table.add_field(Field::new(LENGTH_FIELD, FieldType::Double))?;
    let length_index = table.fields.len() - 1;
    for row in &mut table.rows {
        row[length_index] = match (row[from_index].as_f64(), row[to_index].as_f64()) {
            (Some(from), Some(to)) => Value::Double(to - from),
            _ => Value::Null,
        };
    }
    Ok(())
}

/// Drop rows whose length is missing or at most [`SLIVER_TOLERANCE`].
pub fn remove_slivers(table: &mut Table) -> Result<usize, TableError> {
    let length_index = table.require_field(LENGTH_FIELD)?;
    let before = table.len();
    table.rows.retain(|row| {
        row[length_index]
            .as_f64()
            .is_some_and(|length| length > SLIVER_TOLERANCE)
    });
    Ok(before - table.len())
}

#[derive(Debug, Default)]
struct RouteExtent {
    /// `None` when the routes layer carries no measure range for this route.
    range: Option<(f64, f64)>,
}

fn route_extents(
    routes: &Table,
    temporal: &TemporalFilter,
    fields: &ControlFields,
) -> Result<HashMap<Value, RouteExtent>, TableError> {
    let route_index = routes.require_field(&fields.route_id)?;
    let valid = temporal.bind(routes)?;
    let measure_indexes = routes
        .field_index(&fields.from_measure)
        .zip(routes.field_index(&fields.to_measure));

    let unreadable = valid.unreadable_rows(routes);
    if unreadable > 0 {
        tracing::warn!(
            table = %routes.name,
            rows = unreadable,
            "route rows with unreadable dates are left out"
        );
    }

    let mut extents: HashMap<Value, RouteExtent> = HashMap::new();
    let mut unbounded: Vec<Value> = Vec::new();
    for row in routes.rows.iter().filter(|row| valid.matches(row)) {
        let route = row[route_index].clone();
        let range = measure_indexes.and_then(|(from_index, to_index)| {
            row[from_index].as_f64().zip(row[to_index].as_f64())
        });
        let extent = extents.entry(route.clone()).or_default();
        match range {
            Some((from, to)) => {
                let (low, high) = (from.min(to), from.max(to));
                extent.range = Some(match extent.range {
                    Some((current_low, current_high)) => {
                        (current_low.min(low), current_high.max(high))
                    }
                    None => (low, high),
                });
            }
            None => unbounded.push(route),
        }
    }
    for route in unbounded {
        if let Some(extent) = extents.get_mut(&route) {
            extent.range = None;
        }
    }
    Ok(extents)
}

fn locate(extent: Option<&RouteExtent>, from: f64, to: f64) -> &'static str {
    let Some(extent) = extent else {
        return LOC_ROUTE_NOT_FOUND;
    };
    let Some((low, high)) = extent.range else {
        return LOC_NO_ERROR;
    };
    if to < low || from > high {
        return LOC_MEASURE_NOT_FOUND;
    }
    match (from < low, to > high) {
        (true, true) => LOC_PARTIAL_BOTH,
        (true, false) => LOC_PARTIAL_FROM,
        (false, true) => LOC_PARTIAL_TO,
        (false, false) => LOC_NO_ERROR,
    }
}

/// Locate output events on the routes valid at the temporal filter's date.
///
/// Every event is kept; `LOC_ERROR` records how it matched.
pub fn locate_events(
    table: &Table,
    routes: &Table,
    temporal: &TemporalFilter,
    fields: &ControlFields,
    name: &str,
) -> Result<Table, TableError> {
    let extents = route_extents(routes, temporal, fields)?;
    let route_index = table.require_field(&fields.route_id)?;
    let from_index = table.require_field(&fields.from_measure)?;
    let to_index = table.require_field(&fields.to_measure)?;

    let mut fields_out = table.fields.clone();
    fields_out.push(Field::new(LOC_ERROR_FIELD, FieldType::Text));
    let mut located = Table::new(name, fields_out);
    let mut unmatched = 0usize;
    for row in &table.rows {
        let from = row[from_index].as_f64().unwrap_or_default();
        let to = row[to_index].as_f64().unwrap_or_default();
        let status = locate(extents.get(&row[route_index]), from, to);
        if status != LOC_NO_ERROR {
            unmatched += 1;
        }
        let mut out = row.clone();
        out.push(Value::Text(status.to_string()));
        located.push_row(out)?;
    }
    tracing::info!(
        routes = extents.len(),
        events = located.len(),
        unmatched,
        filter = %temporal.describe(),
        "located events on routes"
    );
    Ok(located)
}
