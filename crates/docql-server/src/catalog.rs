//! Persisted schema catalog
//!
//! Discovery runs once at import time; the server reads the resulting schema
//! from a JSON file and treats it as read-only afterwards.

use std::path::{Path, PathBuf};

use docql_ir::Schema;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to access schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid schema JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    path: PathBuf,
    schema: Schema,
}

impl SchemaCatalog {
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path_str.clone(),
            source,
        })?;
        let schema: Schema = serde_json::from_str(&contents).map_err(|source| CatalogError::Json {
            path: path_str.clone(),
            source,
        })?;
        info!(
            path = %path_str,
            tables = schema.tables().len(),
            fingerprint = %schema.fingerprint(),
            "Loaded schema"
        );
        Ok(Self::new(path, schema))
    }

    /// Write the schema as pretty JSON, replacing the file atomically
    pub fn save(&self) -> Result<(), CatalogError> {
        let display = self.path.display().to_string();
        let json = serde_json::to_string_pretty(&self.schema).map_err(|source| CatalogError::Json {
            path: display.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|source| CatalogError::Io {
                path: display,
                source,
            })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_ir::{Column, DataType, LogicalTable, SourcePath};

    fn sample_schema() -> Schema {
        let mut schema = Schema::new();
        let mut table = LogicalTable::top("test", "test");
        table
            .columns
            .push(Column::value("Name", SourcePath::root("test").key("Name"), DataType::String));
        schema.add_table(table);
        schema
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");

        let catalog = SchemaCatalog::new(&path, sample_schema());
        catalog.save().unwrap();

        let loaded = SchemaCatalog::load(&path).unwrap();
        assert_eq!(loaded.schema(), catalog.schema());
        assert_eq!(loaded.schema().fingerprint(), sample_schema().fingerprint());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchemaCatalog::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = SchemaCatalog::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid schema JSON"));
    }
}
