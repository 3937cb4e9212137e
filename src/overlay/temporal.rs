//! Temporal validity filtering on from-date/to-date fields.
use crate::table::{Table, TableError, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse an ISO date or datetime string.
///
/// RFC 3339 values with a `Z` or numeric offset are converted to UTC.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.naive_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Read a date cell. `Some(None)` is a null date; `None` means unreadable.
///
/// Integer cells are epoch milliseconds.
pub fn date_value(value: &Value) -> Option<Option<NaiveDateTime>> {
    match value {
        Value::Null => Some(None),
        Value::Text(text) => parse_date(text).map(Some),
        Value::Integer(millis) => {
            DateTime::from_timestamp_millis(*millis).map(|stamp| Some(stamp.naive_utc()))
        }
        Value::Double(_) => None,
    }
}

/// Outcome of the temporal check for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Expired,
    /// A from-date or to-date cell could not be read as a date.
    Unreadable,
}

/// Records valid at `at`: started on or before it and not yet retired.
#[derive(Debug, Clone)]
pub struct TemporalFilter {
    pub at: NaiveDateTime,
    pub from_field: String,
    pub to_field: String,
}

impl TemporalFilter {
    pub fn new(at: NaiveDateTime, from_field: &str, to_field: &str) -> Self {
        Self {
            at,
            from_field: from_field.to_string(),
            to_field: to_field.to_string(),
        }
    }

    pub fn bind(&self, table: &Table) -> Result<BoundTemporal, TableError> {
        Ok(BoundTemporal {
            at: self.at,
            from_index: table.require_field(&self.from_field)?,
            to_index: table.require_field(&self.to_field)?,
        })
    }

    /// Equivalent where-clause, for logging.
    pub fn describe(&self) -> String {
        let at = self.at.format("%Y-%m-%d %H:%M:%S");
        format!(
            "({from} IS NULL OR {from} <= '{at}') AND ({to} IS NULL OR {to} > '{at}')",
            from = self.from_field,
            to = self.to_field,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundTemporal {
    at: NaiveDateTime,
    from_index: usize,
    to_index: usize,
}

impl BoundTemporal {
    pub fn check(&self, row: &[Value]) -> Validity {
        let (Some(from), Some(to)) = (
            date_value(&row[self.from_index]),
            date_value(&row[self.to_index]),
        ) else {
            return Validity::Unreadable;
        };
        if from.is_none_or(|from| from <= self.at) && to.is_none_or(|to| to > self.at) {
            Validity::Valid
        } else {
            Validity::Expired
        }
    }

    /// Unreadable dates never match.
    pub fn matches(&self, row: &[Value]) -> bool {
        self.check(row) == Validity::Valid
    }

    /// Number of rows whose dates cannot be read.
    pub fn unreadable_rows(&self, table: &Table) -> usize {
        table
            .rows
            .iter()
            .filter(|row| self.check(row) == Validity::Unreadable)
            .count()
    }
}
