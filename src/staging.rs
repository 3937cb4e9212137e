//! Per-run staging workspaces.
//!
//! Every run stages its intermediate tables in a fresh, timestamp-named
//! workspace. Reruns never reuse or clean up earlier staging directories.
use crate::table::{TableError, Workspace};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The single timestamp shared by every artifact name in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp(NaiveDateTime);

impl RunStamp {
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    #[cfg(test)]
    pub fn at(moment: NaiveDateTime) -> Self {
        Self(moment)
    }

    /// Suffix used in workspace and table names.
    pub fn suffix(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn to_iso(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}

/// `<base_name>_<stamp>`, as used for staging and output names.
pub fn stamped_name(base_name: &str, stamp: &RunStamp) -> String {
    format!("{base_name}_{}", stamp.suffix())
}

/// Create `<out_dir>/<base_name>_<stamp>` as a new workspace.
///
/// Fails if the directory already exists.
pub fn create_staging_workspace(
    out_dir: &Path,
    base_name: &str,
    stamp: &RunStamp,
) -> Result<Workspace, TableError> {
    let root = out_dir.join(stamped_name(base_name, stamp));
    let workspace = Workspace::create(&root)?;
    tracing::info!(path = %root.display(), "created staging workspace");
    Ok(workspace)
}

/// Write a JSON document under `rel_path` inside a workspace directory.
///
/// Documents belong in subdirectories so they are not listed as tables.
pub fn write_staged_json<T: serde::Serialize>(
    workspace: &Workspace,
    rel_path: &str,
    value: &T,
) -> Result<PathBuf, TableError> {
    let path = workspace.root().join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| TableError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| TableError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, bytes).map_err(|source| TableError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::temporal::parse_date;

    fn stamp() -> RunStamp {
        RunStamp::at(parse_date("2026-03-04T05:06:07").expect("date"))
    }

    #[test]
    fn suffix_is_sortable_timestamp() {
        assert_eq!(stamp().suffix(), "20260304_050607");
        assert_eq!(stamped_name("OVERLAY_OUTPUT_FC", &stamp()), "OVERLAY_OUTPUT_FC_20260304_050607");
    }

    #[test]
    fn staging_workspace_is_fresh_per_stamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace =
            create_staging_workspace(dir.path(), "OVERLAY_STAGING", &stamp()).expect("create");
        assert_eq!(
            workspace.root(),
            dir.path().join("OVERLAY_STAGING_20260304_050607")
        );
        assert!(create_staging_workspace(dir.path(), "OVERLAY_STAGING", &stamp()).is_err());
    }

    #[test]
    fn staged_json_is_not_listed_as_a_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::open(dir.path()).expect("open");
        let path =
            write_staged_json(&workspace, "meta/run_report.json", &[1, 2]).expect("write");
        assert_eq!(path, dir.path().join("meta").join("run_report.json"));
        assert!(workspace.list_tables().expect("list").is_empty());
    }
}
