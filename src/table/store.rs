//! Directory-backed workspace of JSON tables.
use super::{Table, TableError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const TABLE_EXTENSION: &str = "json";

/// A directory holding one `<NAME>.json` file per table.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open an existing workspace directory.
    pub fn open(root: &Path) -> Result<Self, TableError> {
        let metadata = fs::metadata(root).map_err(|source| TableError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(TableError::Io {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "workspace is not a directory",
                ),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create a new workspace directory. Fails if the directory exists.
    pub fn create(root: &Path) -> Result<Self, TableError> {
        if let Some(parent) = root.parent() {
            fs::create_dir_all(parent).map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::create_dir(root).map_err(|source| TableError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Open a workspace, creating the directory when missing.
    pub fn open_or_create(root: &Path) -> Result<Self, TableError> {
        if root.is_dir() {
            return Self::open(root);
        }
        fs::create_dir_all(root).map_err(|source| TableError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted table names stored in this workspace.
    pub fn list_tables(&self) -> Result<Vec<String>, TableError> {
        let entries = fs::read_dir(&self.root).map_err(|source| TableError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| TableError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a table name case-insensitively to its stored name.
    pub fn resolve(&self, name: &str) -> Result<Option<String>, TableError> {
        Ok(self
            .list_tables()?
            .into_iter()
            .find(|stored| stored.eq_ignore_ascii_case(name)))
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> Result<bool, TableError> {
        Ok(self.resolve(name)?.is_some())
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{TABLE_EXTENSION}"))
    }

    pub fn read_table(&self, name: &str) -> Result<Table, TableError> {
        let stored = self
            .resolve(name)?
            .ok_or_else(|| TableError::NotFound(name.to_string()))?;
        read_table_file(&self.table_path(&stored))
    }

    /// Persist a table under its own name, replacing any previous copy.
    pub fn write_table(&self, table: &Table) -> Result<PathBuf, TableError> {
        let path = self.table_path(&table.name);
        let bytes = serde_json::to_vec_pretty(table).map_err(|source| TableError::Json {
            path: path.clone(),
            source,
        })?;
        let io_err = |source| TableError::Io {
            path: path.clone(),
            source,
        };
        let mut staged = tempfile::NamedTempFile::new_in(&self.root).map_err(io_err)?;
        staged.write_all(&bytes).map_err(io_err)?;
        staged
            .persist(&path)
            .map_err(|err| io_err(err.error))?;
        tracing::debug!(table = %table.name, rows = table.len(), "wrote table");
        Ok(path)
    }

    /// Export a table as `<NAME>.csv` with a header row.
    pub fn export_csv(&self, table: &Table) -> Result<PathBuf, TableError> {
        let path = self.root.join(format!("{}.csv", table.name));
        let csv_err = |source| TableError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        writer.write_record(table.field_names()).map_err(csv_err)?;
        for row in &table.rows {
            writer
                .write_record(row.iter().map(|value| value.to_string()))
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|source| TableError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Read a single table file from any location.
pub fn read_table_file(path: &Path) -> Result<Table, TableError> {
    let bytes = fs::read(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: Table = serde_json::from_slice(&bytes).map_err(|source| TableError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    for (index, row) in table.rows.iter().enumerate() {
        if row.len() != table.fields.len() {
            return Err(TableError::Arity {
                table: format!("{} (row {index})", table.name),
                expected: table.fields.len(),
                got: row.len(),
            });
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Field, FieldType, Value};

    #[test]
    fn write_then_list_and_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::open(dir.path()).expect("open workspace");
        let mut table = Table::new("Pavement", vec![Field::new("RouteID", FieldType::Text)]);
        table
            .push_row(vec![Value::Text("R1".into())])
            .expect("push row");
        workspace.write_table(&table).expect("write table");

        assert_eq!(workspace.list_tables().expect("list"), vec!["Pavement"]);
        assert!(workspace.contains("PAVEMENT").expect("contains"));
        let loaded = workspace.read_table("pavement").expect("read table");
        assert_eq!(loaded, table);
    }

    #[test]
    fn create_refuses_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Workspace::create(dir.path()).is_err());
        let fresh = dir.path().join("staging");
        Workspace::create(&fresh).expect("create fresh workspace");
        assert!(fresh.is_dir());
    }

    #[test]
    fn read_rejects_ragged_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Bad.json");
        std::fs::write(
            &path,
            r#"{"name":"Bad","fields":[{"name":"A","type":"text"}],"rows":[["x", 1]]}"#,
        )
        .expect("write file");
        assert!(matches!(
            read_table_file(&path),
            Err(TableError::Arity { .. })
        ));
    }

    #[test]
    fn export_csv_writes_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::open(dir.path()).expect("open workspace");
        let mut table = Table::new(
            "Out",
            vec![
                Field::new("RouteID", FieldType::Text),
                Field::new("Length", FieldType::Double),
            ],
        );
        table
            .push_row(vec![Value::Text("R1".into()), Value::Double(2.5)])
            .expect("push row");
        let path = workspace.export_csv(&table).expect("export");
        let text = std::fs::read_to_string(path).expect("read csv");
        assert_eq!(text, "RouteID,Length\nR1,2.5\n");
    }
}
