//! File-backed tables used as feature classes, event tables, and outputs.
//!
//! A table is a typed field list plus row-major values. Field lookups are
//! case-insensitive, matching geodatabase field naming rules.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use thiserror::Error;

mod filter;
mod store;

pub use filter::Filter;
pub use store::{read_table_file, Workspace};

/// Errors raised by table access, persistence, and filtering.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid table JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV export to {path} failed: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("table {0} not found")]
    NotFound(String),
    #[error("field {field} not found on {table}")]
    MissingField { table: String, field: String },
    #[error("field {field} already exists on {table}")]
    DuplicateField { table: String, field: String },
    #[error("row has {got} values but {table} has {expected} fields")]
    Arity {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid filter expression: {0}")]
    Filter(String),
}

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Double,
    Date,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A single cell. Dates travel as ISO-8601 text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Double(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            Value::Text(text) => text.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Convert a value into the representation used by `field_type`.
    ///
    /// Values that cannot be represented become `Null`.
    pub fn coerce(self, field_type: FieldType) -> Value {
        match (field_type, self) {
            (_, Value::Null) => Value::Null,
            (FieldType::Double, value) => value.as_f64().map_or(Value::Null, Value::Double),
            (FieldType::Integer, Value::Double(value)) if value.fract() == 0.0 => {
                Value::Integer(value as i64)
            }
            (FieldType::Integer, Value::Text(text)) => {
                text.trim().parse().map_or(Value::Null, Value::Integer)
            }
            (FieldType::Integer, value @ Value::Integer(_)) => value,
            (FieldType::Integer, Value::Double(_)) => Value::Null,
            (FieldType::Text | FieldType::Date, Value::Text(text)) => Value::Text(text),
            (FieldType::Text, value) => Value::Text(value.to_string()),
            (FieldType::Date, value) => value,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Double(_) => 1,
            Value::Text(_) => 2,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Text(text) => f.write_str(text),
        }
    }
}

fn canonical(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

fn canonical_bits(value: f64) -> u64 {
    canonical(value).to_bits()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(value) => value.hash(state),
            Value::Double(value) => canonical_bits(*value).hash(state),
            Value::Text(text) => text.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let left = canonical(a.as_f64().unwrap_or_default());
                let right = canonical(b.as_f64().unwrap_or_default());
                left.total_cmp(&right).then_with(|| {
                    // keep Integer(1) and Double(1.0) distinct but ordered
                    matches!(a, Value::Double(_)).cmp(&matches!(b, Value::Double(_)))
                })
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// A named, typed table held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.is_named(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    /// Resolve a field index or report which table lacks it.
    pub fn require_field(&self, name: &str) -> Result<usize, TableError> {
        self.field_index(name)
            .ok_or_else(|| TableError::MissingField {
                table: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.fields.len() {
            return Err(TableError::Arity {
                table: self.name.clone(),
                expected: self.fields.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a field, filling existing rows with `Null`.
    pub fn add_field(&mut self, field: Field) -> Result<(), TableError> {
        if self.has_field(&field.name) {
            return Err(TableError::DuplicateField {
                table: self.name.clone(),
                field: field.name,
            });
        }
        self.fields.push(field);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.field_index(name)?;
        self.rows.get(row).and_then(|values| values.get(index))
    }
}
