use crate::overlay::temporal::parse_date;
use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDateTime};
use std::path::Path;

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Parse the `--date` flag, falling back to the current local time.
pub fn resolve_view_date(raw: Option<&str>) -> Result<NaiveDateTime> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date(value)
            .ok_or_else(|| anyhow!("invalid date {value:?} (expected YYYY-MM-DD)")),
        None => Ok(Local::now().naive_local()),
    }
}
