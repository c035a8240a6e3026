//! Relational schema inferred from a document store

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::path::SourcePath;
use crate::types::DataType;
use crate::{Procedure, ProcedureDescriptor};

/// Identity column carried by every table
pub const DOCUMENT_ID: &str = "documentId";

/// Suffix of the element-position column of an array table
pub const INDEX_SUFFIX: &str = "_idx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// The owning document's external key
    Identity,
    /// Position of the element within its array
    Index,
    /// Data resolved through the column's source path
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourcePath>,
    pub data_type: DataType,
    pub updatable: bool,
    pub role: ColumnRole,
}

impl Column {
    pub fn identity() -> Self {
        Self {
            name: DOCUMENT_ID.to_string(),
            source: None,
            data_type: DataType::String,
            updatable: false,
            role: ColumnRole::Identity,
        }
    }

    pub fn index(table_name: &str) -> Self {
        Self {
            name: format!("{}{}", table_name, INDEX_SUFFIX),
            source: None,
            data_type: DataType::Integer,
            updatable: false,
            role: ColumnRole::Index,
        }
    }

    pub fn value(name: impl Into<String>, source: SourcePath, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            source: Some(source),
            data_type,
            updatable: true,
            role: ColumnRole::Value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    /// Name of the referenced (parent) table
    pub references: String,
}

/// Equality rule that selects one logical table's documents out of a
/// type-partitioned keyspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    /// Attribute name, unquoted
    pub attribute: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalTable {
    pub name: String,
    pub source: SourcePath,
    pub is_array: bool,
    pub supports_update: bool,
    pub columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Discriminator>,
}

impl LogicalTable {
    /// Table over the documents of a keyspace
    pub fn top(name: impl Into<String>, keyspace: &str) -> Self {
        Self {
            name: name.into(),
            source: SourcePath::root(keyspace),
            is_array: false,
            supports_update: true,
            columns: vec![Column::identity()],
            primary_key: Some(PrimaryKey {
                name: "PK0".to_string(),
                columns: vec![DOCUMENT_ID.to_string()],
            }),
            foreign_key: None,
            discriminator: None,
        }
    }

    /// Child table over the elements found at `source`, which must end in
    /// an array marker
    pub fn array(name: impl Into<String>, source: SourcePath, parent: &LogicalTable) -> Self {
        let name = name.into();
        Self {
            columns: vec![Column::identity(), Column::index(&name)],
            name,
            source,
            is_array: true,
            supports_update: true,
            primary_key: None,
            foreign_key: Some(ForeignKey {
                name: "FK0".to_string(),
                columns: vec![DOCUMENT_ID.to_string()],
                references: parent.name.clone(),
            }),
            discriminator: parent.discriminator.clone(),
        }
    }

    pub fn with_discriminator(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.discriminator = Some(Discriminator {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn keyspace(&self) -> &str {
        self.source.keyspace()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn index_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.role == ColumnRole::Index)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.role == ColumnRole::Value)
    }
}

/// The discovered schema: tables in discovery order, plus the raw-document
/// procedures callable against them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: Vec<LogicalTable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    procedures: Vec<ProcedureDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[LogicalTable] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&LogicalTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut LogicalTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Add a table, replacing any table of the same name
    pub fn add_table(&mut self, table: LogicalTable) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    /// Publish the descriptors of every raw-document procedure
    pub fn register_procedures(&mut self) {
        self.procedures = Procedure::ALL.iter().map(Procedure::descriptor).collect();
    }

    pub fn procedures(&self) -> &[ProcedureDescriptor] {
        &self.procedures
    }

    /// Direct children of `parent` through their foreign keys
    pub fn children<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a LogicalTable> {
        self.tables.iter().filter(move |t| {
            t.foreign_key
                .as_ref()
                .is_some_and(|fk| fk.references == parent)
        })
    }

    /// SHA-256 over the canonical JSON form; equal for equal schemas
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Trait for resolving tables at compile time
pub trait SchemaProvider {
    fn get_table(&self, table_name: &str) -> Result<&LogicalTable, String>;
}

impl SchemaProvider for Schema {
    fn get_table(&self, table_name: &str) -> Result<&LogicalTable, String> {
        self.table(table_name)
            .ok_or_else(|| format!("Table '{}' not found", table_name))
    }
}
