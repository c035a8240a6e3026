//! Query execution and result decoding
//!
//! Runs compiled N1QL against a [`docql_ir::DocumentStore`] and turns the
//! nested result documents back into flat rows shaped by the compiler's
//! column metadata.

use docql_ir::{DocValue, StoreError};
use thiserror::Error;

pub mod coerce;
pub mod decoder;
pub mod execution;
pub mod procedure;

pub use coerce::coerce;
pub use decoder::{decode_fragment, Dimension, ResultDecoder};
pub use execution::{ExecutionBudget, Output, QueryExecution};
pub use procedure::{decode_procedure, ProcedureResult};

/// One flat output row, positionally aligned with the select list
pub type Row = Vec<DocValue>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Shape mismatch in column {column}: expected {expected}, found {found}")]
    ShapeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Type mismatch in column {column}: cannot convert {value} to {target}")]
    TypeMismatch {
        column: String,
        value: String,
        target: String,
    },

    #[error("Expected {expected} output types, got {actual}")]
    TypeCount { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),
}
