//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Control-field schema shared by every fixture feature class.
pub const CONTROL_FIELDS: [(&str, &str); 5] = [
    ("RouteID", "text"),
    ("FromMeasure", "double"),
    ("ToMeasure", "double"),
    ("FromDate", "date"),
    ("ToDate", "date"),
];

/// A temp directory holding a source workspace, an index, and a routes table.
pub struct Fixture {
    pub root: TempDir,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(root.path().join("data")).expect("create workspace");
        Self { root }
    }

    pub fn workspace(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.path().join("index.csv")
    }

    pub fn routes_path(&self) -> PathBuf {
        self.root.path().join("routes.json")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.path().join("out")
    }

    /// Write `<name>.json` into the workspace with the control fields first
    /// and `extra` attribute fields after them. Rows list values in the same
    /// order.
    pub fn write_feature_class(&self, name: &str, extra: &[(&str, &str)], rows: Vec<Value>) {
        let fields: Vec<Value> = CONTROL_FIELDS
            .iter()
            .chain(extra)
            .map(|(name, field_type)| json!({"name": name, "type": field_type}))
            .collect();
        let table = json!({"name": name, "fields": fields, "rows": rows});
        write_json(&self.workspace().join(format!("{name}.json")), &table);
    }

    /// Write the index CSV from `(IN_FC, IN_FLD, OUT_FLD_NAME, FC_OV_ORDER)`.
    pub fn write_index(&self, rows: &[(&str, &str, &str, f64)]) {
        let mut text = String::from("IN_FC,IN_FLD,OUT_FLD_NAME,FC_OV_ORDER\n");
        for (fc, field, out, order) in rows {
            text.push_str(&format!("{fc},{field},{out},{order}\n"));
        }
        fs::write(self.index_path(), text).expect("write index");
    }

    /// Routes layer with one always-valid row per `(route, from, to)`.
    pub fn write_routes(&self, routes: &[(&str, f64, f64)]) {
        let rows: Vec<Value> = routes
            .iter()
            .map(|(route, from, to)| json!([route, from, to, null, null]))
            .collect();
        let fields: Vec<Value> = CONTROL_FIELDS
            .iter()
            .map(|(name, field_type)| json!({"name": name, "type": field_type}))
            .collect();
        let table = json!({"name": "Routes", "fields": fields, "rows": rows});
        write_json(&self.routes_path(), &table);
    }

    /// Arguments for `lrs overlay` against this fixture.
    pub fn overlay_args(&self) -> Vec<String> {
        vec![
            "overlay".to_string(),
            "--index".to_string(),
            self.index_path().display().to_string(),
            "--workspace".to_string(),
            self.workspace().display().to_string(),
            "--routes".to_string(),
            self.routes_path().display().to_string(),
            "--out-dir".to_string(),
            self.out_dir().display().to_string(),
            "--date".to_string(),
            "2024-06-01".to_string(),
            "--json".to_string(),
        ]
    }

    /// Entries of the output directory whose names start with `prefix`.
    pub fn out_entries(&self, prefix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.out_dir()) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .collect();
        paths.sort();
        paths
    }

    /// The single output table whose file name starts with `prefix` and ends
    /// with `.json`.
    pub fn read_output_table(&self, prefix: &str) -> Value {
        let path = self
            .out_entries(prefix)
            .into_iter()
            .find(|path| path.extension().is_some_and(|ext| ext == "json"))
            .unwrap_or_else(|| panic!("no output table starting with {prefix}"));
        read_json(&path)
    }
}

pub fn write_json(path: &Path, value: &Value) {
    let text = serde_json::to_string_pretty(value).expect("serialize fixture");
    fs::write(path, text).expect("write fixture");
}

pub fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("read json");
    serde_json::from_str(&text).expect("parse json")
}

/// Run the `lrs` binary with `args`, with logging kept quiet.
pub fn run_lrs<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_lrs"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run lrs")
}

/// Column values of `field` across every row of a serialized table.
pub fn column(table: &Value, field: &str) -> Vec<Value> {
    let fields = table["fields"].as_array().expect("fields array");
    let index = fields
        .iter()
        .position(|candidate| candidate["name"] == field)
        .unwrap_or_else(|| panic!("field {field} missing"));
    table["rows"]
        .as_array()
        .expect("rows array")
        .iter()
        .map(|row| row[index].clone())
        .collect()
}

/// Numeric column values, for measure and length comparisons.
pub fn numbers(table: &Value, field: &str) -> Vec<f64> {
    column(table, field)
        .iter()
        .map(|value| value.as_f64().expect("numeric value"))
        .collect()
}
