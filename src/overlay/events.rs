//! Field mapping, event copy, null normalization, and measure rounding.
use super::index::FeatureClassPlan;
use super::{ControlFields, OverlayError};
use crate::table::{Field, FieldType, Table, Value};
use std::collections::HashSet;

/// Replacement for null text values.
pub const TEXT_NULL: &str = ".";
/// Replacement for null numeric values.
pub const NUMERIC_NULL: i64 = -999;
/// Replacement for numeric values that are exactly zero.
pub const NUMERIC_ZERO: i64 = -888;
/// Replacement for null values of any other type.
pub const OTHER_NULL: i64 = 0;

/// A single source-to-target field projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
}

impl FieldMapping {
    fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Build the ordered projection for one feature class.
///
/// Index-declared fields come first in row order, followed by route id,
/// from-measure, and to-measure under their configured names.
pub fn build_field_mapping(
    plan: &FeatureClassPlan,
    source: &Table,
    fields: &ControlFields,
) -> Result<Vec<FieldMapping>, OverlayError> {
    let controls = fields.measure_and_route();
    let pairs = plan
        .mappings
        .iter()
        .map(|(input, output)| (input.as_str(), output.as_str()))
        .chain(controls.iter().map(|name| (*name, *name)));

    let mut seen_targets = HashSet::new();
    let mut mappings = Vec::new();
    for (input, output) in pairs {
        if !source.has_field(input) {
            return Err(OverlayError::Mapping {
                feature_class: plan.name.clone(),
                reason: format!("source field {input} does not exist"),
            });
        }
        if !seen_targets.insert(output.to_ascii_uppercase()) {
            return Err(OverlayError::Mapping {
                feature_class: plan.name.clone(),
                reason: format!("output field {output} is mapped more than once"),
            });
        }
        mappings.push(FieldMapping::new(input, output));
    }
    Ok(mappings)
}

/// Project the rows of `source` that pass `predicate` through `mappings`.
///
/// Measure fields are stored as doubles in the event table.
pub fn copy_events<P>(
    source: &Table,
    mappings: &[FieldMapping],
    fields: &ControlFields,
    name: &str,
    predicate: P,
) -> Result<Table, OverlayError>
where
    P: Fn(&[Value]) -> bool,
{
    let mut columns = Vec::with_capacity(mappings.len());
    let mut out_fields = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let index = source.require_field(&mapping.source)?;
        let field_type = if fields.is_measure(&mapping.target) {
            FieldType::Double
        } else {
            source.fields[index].field_type
        };
        columns.push((index, field_type));
        out_fields.push(Field::new(mapping.target.clone(), field_type));
    }

    let mut events = Table::new(name, out_fields);
    for row in source.rows.iter().filter(|row| predicate(row)) {
        let projected = columns
            .iter()
            .map(|(index, field_type)| row[*index].clone().coerce(*field_type))
            .collect();
        events.push_row(projected)?;
    }
    tracing::debug!(
        source = %source.name,
        events = %name,
        selected = events.len(),
        total = source.len(),
        "copied events"
    );
    Ok(events)
}

/// Replace nulls (and numeric zeros) with the overlay sentinels.
///
/// The from-measure field is left untouched so real zero starts survive.
pub fn normalize_nulls(table: &mut Table, from_measure_field: &str) {
    let plans: Vec<(FieldType, bool)> = table
        .fields
        .iter()
        .map(|field| (field.field_type, field.is_named(from_measure_field)))
        .collect();
    for row in &mut table.rows {
        for (cell, (field_type, is_from_measure)) in row.iter_mut().zip(&plans) {
            if let Some(replacement) = normalized(cell, *field_type, *is_from_measure) {
                *cell = replacement;
            }
        }
    }
}

fn normalized(cell: &Value, field_type: FieldType, is_from_measure: bool) -> Option<Value> {
    match field_type {
        FieldType::Text => cell.is_null().then(|| Value::Text(TEXT_NULL.to_string())),
        FieldType::Integer | FieldType::Double if is_from_measure => None,
        FieldType::Integer | FieldType::Double => {
            let sentinel = if cell.is_null() {
                NUMERIC_NULL
            } else if cell.as_f64() == Some(0.0) {
                NUMERIC_ZERO
            } else {
                return None;
            };
            Some(numeric_value(sentinel, field_type))
        }
        FieldType::Date => cell.is_null().then_some(Value::Integer(OTHER_NULL)),
    }
}

fn numeric_value(value: i64, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Double => Value::Double(value as f64),
        _ => Value::Integer(value),
    }
}

/// Round `value` to `places` decimal digits.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Round the named double fields of `table` in place.
pub fn round_measures(table: &mut Table, field_names: &[&str], places: u32) {
    let indexes: Vec<usize> = field_names
        .iter()
        .filter_map(|name| table.field_index(name))
        .collect();
    for row in &mut table.rows {
        for index in &indexes {
            if let Value::Double(value) = row[*index] {
                row[*index] = Value::Double(round_to(value, places));
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
