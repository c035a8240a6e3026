//! Column-position metadata produced alongside the native text
//!
//! The decoder needs to know, for every output position, where its value sits
//! in a native result row. Natively projected values are found by alias; array
//! table columns are found by unwinding the projected array.

use docql_ir::{DataType, Limit, Procedure, Segment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    /// Document key, projected through `META()`
    Identity,
    /// Any natively computed value
    Scalar,
    /// Element position within the array table's own level
    Index,
    /// Value inside an array element; an empty leaf is the element itself
    Element {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        leaf: Vec<String>,
    },
}

impl ColumnKind {
    pub fn is_array(&self) -> bool {
        matches!(self, ColumnKind::Index | ColumnKind::Element { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColumn {
    /// Generated output alias (`$cN`)
    pub alias: String,
    /// User-facing alias, or the column name for bare references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub kind: ColumnKind,
    pub data_type: DataType,
}

/// The single array projected by a query over an array table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayProjection {
    pub table: String,
    /// `LET` binding holding the outermost array
    pub binding: String,
    /// Output alias the binding is projected under
    pub alias: String,
    /// Path steps from the outermost array's elements down to the table's
    /// own elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub n1ql: String,
    pub columns: Vec<SelectColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayProjection>,
    /// Row window applied after array expansion instead of natively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Limit>,
}

impl CompiledQuery {
    /// Generated aliases, position-aligned with the select list
    pub fn select_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.alias.as_str()).collect()
    }

    /// User-facing aliases, position-aligned with the select list
    pub fn select_column_references(&self) -> Vec<Option<&str>> {
        self.columns.iter().map(|c| c.reference.as_deref()).collect()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProcedure {
    pub procedure: Procedure,
    pub n1ql: String,
}

/// Output of compiling one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Compiled {
    Query(CompiledQuery),
    Procedure(CompiledProcedure),
}

impl Compiled {
    pub fn n1ql(&self) -> &str {
        match self {
            Compiled::Query(q) => &q.n1ql,
            Compiled::Procedure(p) => &p.n1ql,
        }
    }
}
