//! N1QL query compiler
//!
//! Compiles relational commands over a discovered schema into N1QL text and
//! the column-position metadata the result decoder needs.

use docql_registry::RegistryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod alias;
pub mod compiler;
pub mod dispatch;
pub mod metadata;
pub mod procedures;
pub mod state;

pub use compiler::{Compiler, MAX_LIMIT};
pub use dispatch::{DispatchTable, EmitFn, Emitted, ExprKind};
pub use metadata::{
    ArrayProjection, ColumnKind, Compiled, CompiledProcedure, CompiledQuery, SelectColumn,
};
pub use procedures::compile_call;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    #[error("Column {column} of table {table} has no resolvable source path")]
    UnresolvedSource { table: String, column: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Render an offset-only window as `LIMIT <max> OFFSET n`
    #[serde(default = "default_true")]
    pub offset_requires_limit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            offset_requires_limit: true,
        }
    }
}
